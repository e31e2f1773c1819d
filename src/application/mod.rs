//! Application layer wiring DTOs and the query pipeline for kubequery.

pub mod dtos;
pub mod services;

pub use dtos::{
    ErrorResponse, HealthStatusResponse, KindDescriptor, KindListResponse, QueryRequest,
    QueryResponse,
};
pub use services::QueryService;
