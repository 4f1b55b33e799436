pub mod dtos;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod stores;
pub mod workers;

pub use services::{AccidentService, DecisionEngine, DecisionPolicy, HttpClassifier};
pub use stores::{AccidentStore, InMemoryAccidentStore, PgAccidentStore};
pub use workers::ClassificationRetryWorker;
