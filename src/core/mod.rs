//! Core recycling structures - the hot path
//!
//! This module contains the lock-free single pool and its parts:
//! - HeadWord: packed index + ABA tag + write-lock bit in one u64
//! - BasketStorage: lazily extended jagged backing array
//! - SinglePool: the bounded lock-free stack of recyclable objects

pub mod head;
pub mod pool;
pub mod storage;

pub use head::HeadWord;
pub use pool::SinglePool;
pub use storage::BasketStorage;
