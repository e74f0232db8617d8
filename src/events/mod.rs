//! # Events Module
//!
//! Event-driven progress reporting.
//!
//! ## Design
//! The core library emits events through channels, allowing any UI
//! (CLI, GUI, web) to subscribe and display progress.
//!
//! ## Example
//! ```rust,ignore
//! let (sender, receiver) = events::channel();
//!
//! std::thread::spawn(move || {
//!     for event in receiver.iter() {
//!         if let Event::Populate(PopulateEvent::Progress(p)) = event {
//!             println!("Computed {}/{}", p.completed, p.total);
//!         }
//!     }
//! });
//!
//! let mut builder = Builder::open(origin, &settings)?.with_events(sender);
//! builder.populate(&paths)?;
//! ```

mod channel;
mod types;

pub use channel::{channel, EventReceiver, EventSender};
pub use types::*;
