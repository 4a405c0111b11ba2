//! Provider specific [`ModelGateway`](crate::gateway::ModelGateway) implementations.

pub mod openai;
