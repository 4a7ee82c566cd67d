//! Command channel from the companion processor.
//!
//! The companion processor owns the UI and asks this side to perform
//! filesystem and firmware operations. Each request is one command word plus
//! a flat array of argument words. Buffers shared between the processors are
//! described by [`IpcBuffer`] and kept coherent with explicit cache
//! maintenance around every command.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`command`] | command ids, command-word packing, argument decoding |
//! | [`handler`] | the [`Dispatcher`] and the collaborator traits it calls |

pub mod command;
pub mod handler;

pub use command::{CommandId, Request, make_cmd};
pub use handler::{Dispatcher, FsSurface, Hal};

/// A buffer in memory shared with the companion processor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IpcBuffer {
    pub ptr: u32,
    pub size: u32,
}

impl IpcBuffer {
    pub const fn new(ptr: u32, size: u32) -> Self {
        Self { ptr, size }
    }

    /// Read descriptor `index` from an argument word array.
    pub fn from_words(words: &[u32], index: usize) -> Option<Self> {
        let ptr = *words.get(index * 2)?;
        let size = *words.get(index * 2 + 1)?;
        Some(Self::new(ptr, size))
    }

    /// Whether the descriptor names real memory. Null or empty descriptors
    /// get no cache maintenance.
    pub const fn is_active(&self) -> bool {
        self.ptr != 0 && self.size != 0
    }
}
