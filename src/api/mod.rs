pub mod dashboard;
pub mod diagnostics;
pub mod routes;
