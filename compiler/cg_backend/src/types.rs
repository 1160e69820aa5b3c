//! Backend-level data types and declaration attributes.

/// Machine-level type of an IR node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    Bool,
    /// Integer of the given bit width.
    Int(u16),
    /// Float of the given bit width.
    Float(u16),
    Ptr,
}

impl DataType {
    pub const I8: DataType = DataType::Int(8);
    pub const I16: DataType = DataType::Int(16);
    pub const I32: DataType = DataType::Int(32);
    pub const I64: DataType = DataType::Int(64);

    /// Width in bytes.
    pub const fn bytes(self) -> u64 {
        match self {
            DataType::Bool => 1,
            DataType::Int(bits) | DataType::Float(bits) => bits as u64 / 8,
            DataType::Ptr => 8,
        }
    }
}

/// Symbol visibility.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Linkage {
    Public,
    Private,
}

/// Inlining request forwarded untouched to the backend.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum Inlining {
    #[default]
    Default,
    Always,
    Never,
}

/// Parameter and result types of a backend function.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Prototype {
    pub params: Vec<DataType>,
    pub returns: Vec<DataType>,
}

impl Prototype {
    pub fn new(params: Vec<DataType>, returns: Vec<DataType>) -> Self {
        Prototype { params, returns }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CastOp {
    SignExtend,
    ZeroExtend,
    Truncate,
    PtrToInt,
    IntToPtr,
}
