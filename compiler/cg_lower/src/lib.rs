//! Value and address lowering.
//!
//! Turns checked procedure bodies (`cg_ir`) into backend IR through the
//! `cg_backend` traits. The pieces, bottom-up:
//!
//! - [`Value`]: an operand, either a plain node, the address of a datum or a
//!   backend symbol.
//! - [`Addr`]: a storage location plus the protocol used to load from and
//!   store to it (maps, `#soa` elements, relative pointers, swizzles, ...).
//! - [`Procedure`] / [`ProcArena`]: per-procedure codegen records forming a
//!   parent/children forest.
//! - [`Module`]: shared state for one generation phase (entity cache, name
//!   tables, type-info tables) and the parallel driver.
//!
//! # Threading
//!
//! `Module::generate` lowers top-level procedures on a rayon pool. Each
//! worker owns its function builder and the subtree of nested procedures it
//! creates; everything shared goes through the module's locks.
//!
//! # Debugging
//!
//! Set `RUST_LOG=cg_lower=debug` (or `trace`) and call [`init_tracing`].

mod abi;
mod addr;
mod config;
mod error;
mod generate;
mod lower;
mod module;
mod procedure;
mod runtime;
mod stack;
mod type_info;
mod value;

use std::sync::Once;

pub use addr::{Addr, AddrKind, LargeSwizzle, MapElement, SmallSwizzle, SoaElement};
pub use config::LowerConfig;
pub use error::{GenerateError, GenerateReport, LowerError, ProcFailure};
pub use module::{Module, ProcEntry};
pub use procedure::{ProcArena, ProcFlags, ProcId, ProcState, Procedure};
pub use runtime::{
    CLEANUP_RUNTIME_PROC_NAME, ENTRY_POINT_NAME, MAP_GET_PROC_NAME, MAP_SET_PROC_NAME,
    STARTUP_RUNTIME_PROC_NAME, STARTUP_TYPE_INFO_PROC_NAME,
};
pub use type_info::{
    MemberSlots, TypeInfoCounts, TypeInfoSlot, TypeInfoTables, TYPE_INFO_DATA_NAME,
    TYPE_INFO_NAMES_DATA_NAME, TYPE_INFO_OFFSETS_DATA_NAME, TYPE_INFO_RECORD_SIZE,
    TYPE_INFO_TAGS_DATA_NAME, TYPE_INFO_TYPES_DATA_NAME, TYPE_INFO_USINGS_DATA_NAME,
};
pub use value::{Value, ValueKind};

/// Separator between package and procedure name in symbol names.
pub const PKG_NAME_SEPARATOR: &str = ".";

static TRACING_INIT: Once = Once::new();

/// Initialize tracing subscriber for debug output.
///
/// Call once at startup. Does nothing unless `RUST_LOG` is set.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}
