mod accident_dto;

pub use accident_dto::*;
