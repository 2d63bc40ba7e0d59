mod acceptor;
mod learner;
mod local;
mod network;
mod node;
mod proposer;
mod rpc;
mod storage;

pub use acceptor::*;
pub use learner::*;
pub use local::*;
pub use network::*;
pub use node::*;
pub use proposer::*;
pub use rpc::*;
pub use storage::*;
