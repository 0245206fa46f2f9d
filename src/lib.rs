//! Channel sidebar core for a local RSS/Atom reader.
//!
//! The [`list::ChannelList`] keeps an ordered list of channels and folders
//! with live unread counters. It is patched by count deltas from the
//! [`bus::EventBus`], reordered by drag gestures, and reconciled after a
//! bounded-concurrency bulk sync ([`refresh`]). All data access goes through
//! the [`source::ChannelSource`] trait; [`source::LocalSource`] implements it
//! over SQLite ([`storage`]) and HTTP ([`feed`]).

pub mod bus;
pub mod config;
pub mod feed;
pub mod list;
pub mod model;
pub mod refresh;
pub mod source;
pub mod storage;
pub mod util;
