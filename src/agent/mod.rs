//! Browser access: the raw CDP client and the DOM port the page engine drives.

pub mod cdp;
pub mod dom;
pub mod memory;

pub use cdp::{CDPClient, CdpEvent};
pub use dom::{CdpDom, DomEvent, ElementLabel, ElementRef, PageDom, SelectOptionEntry};
pub use memory::{MemoryDom, MemoryElement};
