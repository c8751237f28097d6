//! # Events Module
//!
//! Progress reporting for the archiving engine.
//!
//! The engine emits events through a channel so any front end (the CLI
//! progress bar, a JSON logger, a test) can subscribe without the core
//! knowing how progress is rendered.
//!
//! ## Example
//! ```rust,ignore
//! let (sender, receiver) = EventChannel::new();
//!
//! std::thread::spawn(move || {
//!     for event in receiver.iter() {
//!         if let Event::Organize(OrganizeEvent::Progress { percent, .. }) = event {
//!             println!("{percent}%");
//!         }
//!     }
//! });
//!
//! archiver.run_with_events(&sender)?;
//! ```

mod channel;
mod types;

pub use channel::{null_sender, EventChannel, EventReceiver, EventSender};
pub use types::*;
