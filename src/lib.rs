#[macro_use]
extern crate derivative;

#[macro_use]
extern crate log;

mod commit;
mod config;
mod error;
mod instance;
mod message;
mod node;
mod replica;
mod role;
mod shared;
mod state;
pub mod storage;

pub use crate::commit::{CommitContext, CommitResult, Committer};
pub use crate::config::Config;
pub use crate::error::{Error, Result};
pub use crate::instance::Instance;
pub use crate::message::{Ballot, Body, ChosenValue, InstanceId, Message, MessageKind, NodeId};
pub use crate::node::{Node, Ready};
pub use crate::replica::Replica;
pub use crate::role::{Acceptor, Learner, Outbox, Proposer};
pub use crate::shared::{Hub, Shared};
pub use crate::state::{State, Transport};
pub use crate::storage::{FileStorage, Log, MemoryStorage, Storage};
