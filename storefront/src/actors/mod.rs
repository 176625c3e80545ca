pub mod event_store;

pub use event_store::{EventStoreActor, EventStoreArguments, EventStoreMsg, RequestLog};
