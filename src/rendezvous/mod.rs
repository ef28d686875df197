//! Filesystem rendezvous shared by the producer and consumer processes.
//!
//! The rendezvous is one directory with four fixed subdirectories, used as a
//! typed queue: the producer publishes audio chunks and control signals, the
//! consumer publishes transcripts, errors, and status. All cross-process
//! mutual exclusion comes from atomic rename-publish, per-session file name
//! spaces, and delete-on-consume; no locks are shared.

pub mod names;
pub mod store;

pub use names::{chunk_metadata_name, chunk_pcm_name, parse_chunk_name, partial_name};
pub use store::{Channel, EntryInfo, RendezvousStore};
