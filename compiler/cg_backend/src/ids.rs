//! Opaque handle newtypes for backend objects.
//!
//! `FunctionId`, `GlobalId` and `ExternalId` are all symbols at the backend
//! level; each wraps the `SymbolId` it names and converts into it.

/// One IR node (an instruction-level value) inside a function.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        NodeId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A named module-level object: function, global or external.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct SymbolId(u32);

impl SymbolId {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        SymbolId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

macro_rules! symbol_subclass {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(SymbolId);

        impl $name {
            #[inline]
            pub const fn new(symbol: SymbolId) -> Self {
                $name(symbol)
            }

            /// The symbol this handle names.
            #[inline]
            pub const fn symbol(self) -> SymbolId {
                self.0
            }
        }

        impl From<$name> for SymbolId {
            #[inline]
            fn from(id: $name) -> SymbolId {
                id.0
            }
        }
    };
}

symbol_subclass!(
    /// A function defined in this module.
    FunctionId
);
symbol_subclass!(
    /// A global variable defined in this module.
    GlobalId
);
symbol_subclass!(
    /// A symbol resolved at link time.
    ExternalId
);
