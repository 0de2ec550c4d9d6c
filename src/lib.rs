//! # tagalloc - A Boundary-Tag Free-List Allocator
//!
//! This crate provides an allocator that manages a **single fixed-size arena**
//! reserved once with `mmap(2)`, handing out and taking back blocks with
//! explicit free-list management, splitting and coalescing.
//!
//! ## Overview
//!
//! The arena is always tiled, without gaps, by blocks that are either free or
//! allocated:
//!
//! ```text
//!   Arena (1024 bytes by default):
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │ ┌────────────┐┌──────┐┌──────┐┌──────────────────────────────────┐   │
//!   │ │     A1     ││  F   ││  A2  ││               F                  │   │
//!   │ │ allocated  ││ free ││alloc ││              free                │   │
//!   │ └────────────┘└──────┘└──────┘└──────────────────────────────────┘   │
//!   │                  ▲                            ▲                      │
//!   │                  └──────── free list ─────────┘                      │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   Free blocks are threaded together through links stored in their own
//!   headers. Newly freed blocks are pushed to the front of the list.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   tagalloc
//!   ├── align      - Rounding macro (align_to!)
//!   ├── allocator  - Allocator: allocate, release, split, coalesce
//!   ├── arena      - Backing trait, mmap backing, bounds-checked arena bytes
//!   ├── block      - In-band header / boundary tag layout (internal)
//!   ├── config     - Config: strategy, arena size, alignment
//!   ├── error      - AllocError
//!   ├── free_list  - Intrusive doubly-linked free list (internal)
//!   └── strategy   - SearchMode: first, best and worst fit
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use tagalloc::{Allocator, Config, SearchMode};
//!
//! let mut allocator = Allocator::new(Config::new(SearchMode::BestFit)).unwrap();
//!
//! let ptr = allocator.allocate(600).unwrap();
//! unsafe { ptr.as_ptr().write_bytes(0xAB, 600) };
//!
//! assert_eq!(allocator.usable_size(ptr.as_ptr()), Ok(608));
//!
//! allocator.release(ptr.as_ptr()).unwrap();
//! assert_eq!(allocator.free_blocks().len(), 1);
//! ```
//!
//! ## How It Works
//!
//! Each block carries a header in front of its payload and a boundary tag
//! behind it:
//!
//! ```text
//!   Single Block:
//!   ┌───────────────────────┬────────────────────────────┬──────────────────┐
//!   │    Header             │         Payload            │  Boundary Tag    │
//!   │  ┌─────────────────┐  │                            │ ┌──────────────┐ │
//!   │  │ size: N         │  │  ┌──────────────────────┐  │ │ size: N      │ │
//!   │  │ state           │  │  │                      │  │ │ state        │ │
//!   │  │ next free       │  │  │   N bytes usable     │  │ └──────────────┘ │
//!   │  │ prev free       │  │  │                      │  │                  │
//!   │  └─────────────────┘  │  └──────────────────────┘  │                  │
//!   │      16 bytes         │                            │    16 bytes      │
//!   └───────────────────────┴────────────────────────────┴──────────────────┘
//!                           ▲
//!                           └── Pointer returned to user
//! ```
//!
//! Allocating rounds the request up to the alignment, picks a free block with
//! the configured [`SearchMode`] and splits off the unused tail when it is big
//! enough to be useful. Releasing looks right through the header size and left
//! through the tag in front of the header, merging with whichever neighbour is
//! free, so no two free blocks are ever adjacent.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: `Allocator` is neither `Send` nor `Sync`
//! - **Fixed arena**: the arena never grows or shrinks
//! - **Rounding only**: payload sizes are multiples of the alignment, payload
//!   addresses carry no stronger guarantee
//! - **Unix-only**: requires `libc` and `mmap` (POSIX systems)

pub mod align;
mod allocator;
mod arena;
mod block;
mod config;
mod error;
mod free_list;
mod strategy;

pub use allocator::{Allocator, Stats};
pub use arena::{Backing, MmapBacking};
pub use block::BlockInfo;
pub use config::{Config, DEFAULT_ALIGNMENT, DEFAULT_ARENA_SIZE};
pub use error::AllocError;
pub use strategy::SearchMode;
