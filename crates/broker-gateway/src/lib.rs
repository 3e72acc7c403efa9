pub mod gateway;
pub mod retcode;
pub mod sim;
pub mod types;

pub use gateway::*;
pub use retcode::*;
pub use sim::SimGateway;
pub use types::*;
