#![warn(missing_docs, missing_debug_implementations)]

//! Check whether usernames are available on Roblox.
//!
//! This library validates candidates against the platform's username
//! rules, then queries the public users API through a fixed fallback
//! chain -- direct bulk lookup, keyword search, keyword search via a
//! public relay -- and normalizes whatever answered into one result
//! record. Lookups are gated by a local call budget so bulk runs cannot
//! turn into request storms, and a set of pure generators produces
//! candidate names to feed into the checker.
//!
//! # Example
//!
//! ```no_run
//! use roblox_avail::budget::RateBudget;
//! use roblox_avail::check::{Client, Status, resolve};
//!
//! let client = Client::new();
//! let budget = RateBudget::new();
//! match resolve(&client, &budget, "my_cool_name") {
//!     Ok(result) if result.status == Status::Available => println!("Name is available!"),
//!     Ok(result) if result.status == Status::Taken => println!("Already taken."),
//!     Ok(result) => println!("Could not check: {:?}", result.error),
//!     Err(e) => eprintln!("Error: {e}"),
//! }
//! ```

pub mod budget;
pub mod check;
pub mod history;
pub mod namegen;
