mod common;
mod hostcalls;
mod outgoing;
mod policy;
