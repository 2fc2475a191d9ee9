pub mod authoring_dto;
pub mod public_dto;
