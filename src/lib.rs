#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg, doc_cfg_hide))]
#![cfg_attr(docsrs, doc(cfg_hide(docsrs, loom)))]
#![warn(missing_docs, missing_debug_implementations)]

#[macro_use]
mod util;

pub(crate) mod loom;

pub mod error;
pub mod identity;
pub mod queue;
pub mod rwlock;
pub mod timeout;

#[doc(inline)]
pub use self::error::{Closed, LockError, LockKind, PopError};
#[doc(inline)]
pub use self::identity::{CurrentIdentity, CurrentThread, Identity};
#[doc(inline)]
pub use self::queue::BlockingQueue;
#[doc(inline)]
pub use self::rwlock::{HeldCounts, LockState, ReadGuard, RwLock, ThreadRwLock, WriteGuard};
#[doc(inline)]
pub use self::timeout::Timeout;
