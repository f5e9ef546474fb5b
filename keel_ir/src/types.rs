//! Semantic kinds carried by every source and target value.

use std::fmt;

/// The semantic kind of a value.
///
/// Sub-int kinds (`Boolean`, `Byte`, `Short`, `Char`) only describe storage;
/// arithmetic on them happens at `Int` width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
    /// Machine word (untraced pointer-sized integer).
    Word,
    /// Traced object reference, visible to the garbage collector.
    Reference,
    Void,
}

impl Kind {
    /// Width in bits. `Word` and `Reference` are pointer-sized (64 bits).
    pub fn width(self) -> u32 {
        match self {
            Kind::Void => 0,
            Kind::Boolean | Kind::Byte => 8,
            Kind::Short | Kind::Char => 16,
            Kind::Int | Kind::Float => 32,
            Kind::Long | Kind::Double | Kind::Word | Kind::Reference => 64,
        }
    }

    pub fn is_reference(self) -> bool {
        self == Kind::Reference
    }

    pub fn is_floating(self) -> bool {
        matches!(self, Kind::Float | Kind::Double)
    }

    pub fn is_void(self) -> bool {
        self == Kind::Void
    }

    /// Whether the kind is an integer kind (including `Word`).
    pub fn is_integral(self) -> bool {
        matches!(
            self,
            Kind::Boolean | Kind::Byte | Kind::Short | Kind::Char | Kind::Int | Kind::Long | Kind::Word
        )
    }

    /// The kind a constant of this kind takes once widened to at least a
    /// machine word. Floating point and 64-bit kinds are kept as is.
    pub fn widened(self) -> Kind {
        match self {
            Kind::Boolean | Kind::Byte | Kind::Short | Kind::Char | Kind::Int => Kind::Word,
            other => other,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::Boolean => "bool",
            Kind::Byte => "byte",
            Kind::Short => "short",
            Kind::Char => "char",
            Kind::Int => "int",
            Kind::Long => "long",
            Kind::Float => "float",
            Kind::Double => "double",
            Kind::Word => "word",
            Kind::Reference => "ref",
            Kind::Void => "void",
        };
        f.write_str(s)
    }
}
