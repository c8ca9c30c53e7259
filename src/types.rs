use indexmap::IndexMap;
use std::fmt;

/// Resolved semantic type. Named aggregates are keyed into the
/// [`TypeTable`] by their (possibly namespace-qualified) name.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Int { width: u32, signed: bool },
    Float { width: u32 },
    Char,
    Str,
    Void,
    Ptr { pointee: Box<Type>, pointee_const: bool },
    Array(Box<Type>),
    Struct(String),
    Enum(String),
    Union(String),
    Func(Vec<Type>, Box<Type>),
}

impl Type {
    pub fn int(width: u32) -> Type {
        Type::Int {
            width,
            signed: true,
        }
    }

    pub fn ptr(pointee: Type) -> Type {
        Type::Ptr {
            pointee: Box::new(pointee),
            pointee_const: false,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Int { .. } | Type::Char | Type::Enum(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float { .. })
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Ptr { .. })
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(self, Type::Int { signed: false, .. })
    }

    /// Scalar values that travel through `%rax`.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Type::Struct(_) | Type::Union(_) | Type::Array(_) | Type::Void)
    }

    pub fn size(&self, table: &TypeTable) -> u32 {
        match self {
            Type::Int { width, .. } => width / 8,
            Type::Float { width } => width / 8,
            Type::Char => 1,
            Type::Str => 8,
            Type::Void => 0,
            Type::Ptr { .. } => 8,
            // { T* data; int<64> length; int<64> capacity; }
            Type::Array(_) => 24,
            Type::Struct(name) => table.structs.get(name).map_or(0, |s| s.size),
            Type::Enum(_) => 4,
            Type::Union(name) => table.unions.get(name).map_or(0, |u| u.size),
            Type::Func(_, _) => 8,
        }
    }

    pub fn align(&self, table: &TypeTable) -> u32 {
        match self {
            Type::Struct(name) => table.structs.get(name).map_or(1, |s| s.align),
            Type::Union(name) => table.unions.get(name).map_or(1, |u| u.align),
            Type::Array(_) => 8,
            _ => self.size(table).clamp(1, 8),
        }
    }

    /// GAS operand suffix for this type's width.
    pub fn suffix(&self, table: &TypeTable) -> char {
        match self.size(table) {
            1 => 'b',
            2 => 'w',
            4 => 'l',
            _ => 'q',
        }
    }

    /// System V AMD64 argument class.
    pub fn abi_class(&self) -> AbiClass {
        match self {
            Type::Float { .. } => AbiClass::Sse,
            Type::Array(_) => AbiClass::ArrayTriple,
            _ => AbiClass::Integer,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int { width, signed } => {
                if !signed {
                    write!(f, "unsigned ")?;
                }
                write!(f, "int<{width}>")
            }
            Type::Float { width } => write!(f, "float<{width}>"),
            Type::Char => write!(f, "char"),
            Type::Str => write!(f, "string"),
            Type::Void => write!(f, "void"),
            Type::Ptr { pointee, .. } => write!(f, "{pointee}*"),
            Type::Array(elem) => write!(f, "array<{elem}>"),
            Type::Struct(name) | Type::Enum(name) | Type::Union(name) => write!(f, "{name}"),
            Type::Func(params, ret) => {
                let params = params
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "fnct({params}) -> {ret}")
            }
        }
    }
}

/// Argument class for C-ABI call emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbiClass {
    Integer,
    Sse,
    /// `array<T>` passes as three integer-class values: data, len, cap.
    ArrayTriple,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub ty: Type,
    pub offset: u32,
}

#[derive(Debug, Clone)]
pub struct StructInfo {
    pub fields: IndexMap<String, Field>,
    pub size: u32,
    pub align: u32,
}

#[derive(Debug, Clone)]
pub struct EnumInfo {
    pub variants: IndexMap<String, i64>,
}

#[derive(Debug, Clone)]
pub struct UnionInfo {
    pub variants: Vec<Type>,
    pub size: u32,
    pub align: u32,
}

/// All user-defined aggregate types of the translation unit, keyed by their
/// namespace-qualified name.
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    pub structs: IndexMap<String, StructInfo>,
    pub enums: IndexMap<String, EnumInfo>,
    pub unions: IndexMap<String, UnionInfo>,
}

fn align_up(value: u32, align: u32) -> u32 {
    if align == 0 {
        return value;
    }
    value.div_ceil(align) * align
}

impl TypeTable {
    /// Lay out a struct: fields at source order with natural alignment
    /// padding, total size rounded up to the struct's own alignment.
    pub fn layout_struct(&self, fields: &[(String, Type)]) -> StructInfo {
        let mut laid = IndexMap::new();
        let mut offset = 0u32;
        let mut max_align = 1u32;
        for (name, ty) in fields {
            let align = ty.align(self);
            max_align = max_align.max(align);
            offset = align_up(offset, align);
            laid.insert(
                name.clone(),
                Field {
                    ty: ty.clone(),
                    offset,
                },
            );
            offset += ty.size(self);
        }
        StructInfo {
            fields: laid,
            size: align_up(offset, max_align),
            align: max_align,
        }
    }

    /// A union-type's size is the maximum of its variant sizes.
    pub fn layout_union(&self, variants: Vec<Type>) -> UnionInfo {
        let size = variants.iter().map(|v| v.size(self)).max().unwrap_or(0);
        let align = variants.iter().map(|v| v.align(self)).max().unwrap_or(1);
        UnionInfo {
            variants,
            size: align_up(size, align),
            align,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_layout_pads_to_natural_alignment() {
        let table = TypeTable::default();
        let info = table.layout_struct(&[
            ("a".into(), Type::Char),
            ("b".into(), Type::int(32)),
            ("c".into(), Type::Char),
        ]);
        assert_eq!(info.fields["a"].offset, 0);
        assert_eq!(info.fields["b"].offset, 4);
        assert_eq!(info.fields["c"].offset, 8);
        // 9 bytes of fields rounded up to the 4-byte struct alignment
        assert_eq!(info.size, 12);
        assert_eq!(info.align, 4);
    }

    #[test]
    fn empty_struct_is_zero_sized() {
        let table = TypeTable::default();
        let info = table.layout_struct(&[]);
        assert_eq!(info.size, 0);
        assert_eq!(info.align, 1);
    }

    #[test]
    fn union_size_is_max_of_variants() {
        let table = TypeTable::default();
        let info = table.layout_union(vec![Type::int(32), Type::Float { width: 64 }, Type::Char]);
        assert_eq!(info.size, 8);
        assert_eq!(info.align, 8);
    }

    #[test]
    fn array_header_is_three_quadwords() {
        let table = TypeTable::default();
        assert_eq!(Type::Array(Box::new(Type::int(32))).size(&table), 24);
    }
}
