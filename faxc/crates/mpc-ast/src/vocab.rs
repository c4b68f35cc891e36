//! Shared IR vocabulary: variables, constants, operators, types, and
//! visibility. Every later stage (`mpc-tac`, `mpc-loopir`,
//! `mpc-vectorize`) builds its own IR node kinds out of these values
//! rather than redefining them.

use std::fmt;

/// A variable name: either a user-written identifier or a
/// compiler-generated synthetic index, optionally carrying an SSA
/// rename subscript.
///
/// Two `Var`s are equal iff all three fields are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VarName {
    User(mpc_util::Symbol),
    Synthetic(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Var {
    pub name: VarName,
    pub rename_subscript: Option<u32>,
}

impl Var {
    pub fn user(name: mpc_util::Symbol) -> Self {
        Var { name: VarName::User(name), rename_subscript: None }
    }

    pub fn synthetic(id: u32) -> Self {
        Var { name: VarName::Synthetic(id), rename_subscript: None }
    }

    /// Returns a copy of this variable carrying a fresh SSA subscript.
    pub fn with_subscript(self, subscript: u32) -> Self {
        Var { rename_subscript: Some(subscript), ..self }
    }

    pub fn base(self) -> Var {
        Var { rename_subscript: None, ..self }
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name {
            VarName::User(sym) => write!(f, "{}", sym.as_str())?,
            VarName::Synthetic(id) => write!(f, "!{}", id)?,
        }
        if let Some(sub) = self.rename_subscript {
            write!(f, "!{}", sub)?;
        }
        Ok(())
    }
}

/// Closed datatype lattice: `INT` is an unsigned 32-bit value in the
/// generated circuit, `BOOL` a single bit share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DataType {
    Int,
    Bool,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int => write!(f, "int"),
            DataType::Bool => write!(f, "bool"),
        }
    }
}

/// Closed visibility lattice: `PLAINTEXT ⊑ SHARED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Visibility {
    Plaintext,
    Shared,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Plaintext => write!(f, "plaintext"),
            Visibility::Shared => write!(f, "shared"),
        }
    }
}

/// A literal integer or boolean constant tagged with its `DataType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Constant {
    pub value: i64,
    pub datatype: DataType,
}

impl Constant {
    pub fn int(value: i64) -> Self {
        Constant { value, datatype: DataType::Int }
    }

    pub fn bool(value: bool) -> Self {
        Constant { value: value as i64, datatype: DataType::Bool }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// `(visibility?, dims?, datatype?)`, each field possibly unknown
/// (bottom). `dims = 0` is scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct VarType {
    pub visibility: Option<Visibility>,
    pub dims: Option<u32>,
    pub datatype: Option<DataType>,
}

impl VarType {
    pub const UNKNOWN: VarType = VarType { visibility: None, dims: None, datatype: None };

    pub fn new(visibility: Visibility, dims: u32, datatype: DataType) -> Self {
        VarType { visibility: Some(visibility), dims: Some(dims), datatype: Some(datatype) }
    }

    pub fn plaintext_int() -> Self {
        VarType::new(Visibility::Plaintext, 0, DataType::Int)
    }

    pub fn is_plaintext(&self) -> bool {
        self.visibility == Some(Visibility::Plaintext)
    }

    pub fn is_shared(&self) -> bool {
        self.visibility == Some(Visibility::Shared)
    }

    pub fn is_complete(&self) -> bool {
        self.visibility.is_some() && self.dims.is_some() && self.datatype.is_some()
    }

    /// `self.could_become(super)` holds iff each field known in `self`
    /// matches the corresponding field in `super`, or `super`'s field is
    /// unknown.
    pub fn could_become(&self, supertype: &VarType) -> bool {
        field_compatible(self.visibility, supertype.visibility)
            && field_compatible(self.dims, supertype.dims)
            && field_compatible(self.datatype, supertype.datatype)
    }

    /// Drop one dimension (indexing into a list). Leaves `dims` unknown
    /// if it was already unknown.
    pub fn drop_dim(&self) -> VarType {
        VarType { dims: self.dims.map(|d| d.saturating_sub(1)), ..*self }
    }

    /// Add one dimension (constructing a list of this element type).
    pub fn add_dim(&self) -> VarType {
        VarType { dims: self.dims.map(|d| d + 1), ..*self }
    }

    /// Merge a set of types. Visibility: any `SHARED` forces `SHARED`;
    /// all-`PLAINTEXT` stays `PLAINTEXT`. `dims` must agree across all
    /// known values. `datatype` must agree unless `mixed_datatypes_allowed`.
    pub fn merge(types: &[VarType], mixed_datatypes_allowed: bool) -> Result<VarType, TypeMergeError> {
        assert!(!types.is_empty());

        let mut merged = VarType::UNKNOWN;

        if types.iter().any(|t| t.visibility == Some(Visibility::Shared)) {
            merged.visibility = Some(Visibility::Shared);
        } else if types.iter().all(|t| t.visibility == Some(Visibility::Plaintext)) {
            merged.visibility = Some(Visibility::Plaintext);
        }

        let known_dims: Vec<u32> = types.iter().filter_map(|t| t.dims).collect();
        if let Some(first) = known_dims.first() {
            if known_dims.iter().any(|d| d != first) {
                return Err(TypeMergeError::DimsMismatch(types.to_vec()));
            }
            merged.dims = Some(*first);
        }

        let known_datatypes: Vec<DataType> = types.iter().filter_map(|t| t.datatype).collect();
        if let Some(first) = known_datatypes.first() {
            if !mixed_datatypes_allowed && known_datatypes.iter().any(|d| d != first) {
                return Err(TypeMergeError::DatatypeMismatch(types.to_vec()));
            }
            merged.datatype = Some(*first);
        }

        Ok(merged)
    }
}

fn field_compatible<T: PartialEq>(field: Option<T>, supertype_field: Option<T>) -> bool {
    match supertype_field {
        None => true,
        Some(sup) => field.map_or(true, |f| f == sup),
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TypeMergeError {
    #[error("cannot merge types with different dimensionality: {0:?}")]
    DimsMismatch(Vec<VarType>),
    #[error("cannot merge types with different datatypes: {0:?}")]
    DatatypeMismatch(Vec<VarType>),
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", OptDisplay(self.visibility))?;
        let dims = self.dims.unwrap_or(0);
        for _ in 0..dims {
            write!(f, "list[")?;
        }
        write!(f, "{}", OptDisplay(self.datatype))?;
        for _ in 0..dims {
            write!(f, "]")?;
        }
        write!(f, "]")?;
        if self.dims.is_none() {
            write!(f, "(unknown dims)")?;
        }
        Ok(())
    }
}

struct OptDisplay<T>(Option<T>);

impl<T: fmt::Display> fmt::Display for OptDisplay<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(v) => write!(f, "{}", v),
            None => write!(f, "None"),
        }
    }
}

/// A function parameter `var: var_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub var: Var,
    pub var_type: VarType,
    /// Sample inputs recovered from example call sites in the source
    /// file. Opaque to every stage but the emitter; carried verbatim.
    pub default_values: Vec<String>,
    /// Assigned in declaration order starting from 0, for `SHARED`
    /// parameters only.
    pub party_idx: Option<u32>,
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.var, self.var_type)
    }
}

/// Binary operator spellings consumed by the emitter (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    Lt,
    Gt,
    LtE,
    GtE,
    Eq,
    NotEq,
    And,
    Or,
}

impl BinOpKind {
    pub fn get_ret_datatype(self) -> DataType {
        use BinOpKind::*;
        match self {
            Add | Sub | Mul | Div | Mod | Shl | Shr => DataType::Int,
            Lt | Gt | LtE | GtE | Eq | NotEq | And | Or => DataType::Bool,
        }
    }

    /// The set of datatypes this operator accepts on its operands.
    pub fn get_operand_datatypes(self) -> &'static [DataType] {
        use BinOpKind::*;
        match self {
            Add | Sub | Mul | Div | Mod | Shl | Shr | Lt | Gt | LtE | GtE => &[DataType::Int],
            Eq | NotEq | And | Or => &[DataType::Int, DataType::Bool],
        }
    }
}

impl fmt::Display for BinOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use BinOpKind::*;
        let s = match self {
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "//",
            Mod => "%",
            Shl => "<<",
            Shr => ">>",
            Lt => "<",
            Gt => ">",
            LtE => "<=",
            GtE => ">=",
            Eq => "==",
            NotEq => "!=",
            And => "and",
            Or => "or",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOpKind {
    Negate,
    Not,
}

impl UnaryOpKind {
    pub fn get_ret_datatype(self) -> DataType {
        match self {
            UnaryOpKind::Negate => DataType::Int,
            UnaryOpKind::Not => DataType::Bool,
        }
    }

    pub fn get_operand_datatypes(self) -> &'static [DataType] {
        match self {
            UnaryOpKind::Negate => &[DataType::Int],
            UnaryOpKind::Not => &[DataType::Bool, DataType::Int],
        }
    }
}

impl fmt::Display for UnaryOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnaryOpKind::Negate => "-",
            UnaryOpKind::Not => "not",
        };
        write!(f, "{}", s)
    }
}

/// A binary operator expression `left operator right`, generic over the
/// operand representation so the restricted AST, TAC, and SSA forms can
/// each plug in their own operand type while sharing this shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BinOp<Operand> {
    pub left: Box<Operand>,
    pub operator: BinOpKind,
    pub right: Box<Operand>,
}

impl<Operand: fmt::Display> fmt::Display for BinOp<Operand> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.left, self.operator, self.right)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnaryOp<Operand> {
    pub operator: UnaryOpKind,
    pub operand: Box<Operand>,
}

impl<Operand: fmt::Display> fmt::Display for UnaryOp<Operand> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.operator, self.operand)
    }
}

/// The restricted expression grammar legal inside a subscript: no
/// list/tuple constructors, only scalars and operators over scalars.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptIndex {
    Var(Var),
    Constant(Constant),
    BinOp(BinOp<SubscriptIndex>),
    UnaryOp(UnaryOp<SubscriptIndex>),
}

impl fmt::Display for SubscriptIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptIndex::Var(v) => write!(f, "{}", v),
            SubscriptIndex::Constant(c) => write!(f, "{}", c),
            SubscriptIndex::BinOp(b) => write!(f, "{}", b),
            SubscriptIndex::UnaryOp(u) => write!(f, "{}", u),
        }
    }
}

/// An array subscript expression `array[index]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscript {
    pub array: Var,
    pub index: SubscriptIndex,
}

impl fmt::Display for Subscript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.array, self.index)
    }
}

/// Either endpoint of a `For` loop bound: plaintext-only per spec §3.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LoopBound {
    Var(Var),
    Constant(Constant),
}

impl fmt::Display for LoopBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopBound::Var(v) => write!(f, "{}", v),
            LoopBound::Constant(c) => write!(f, "{}", c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_display_user_vs_synthetic() {
        let sym = mpc_util::Symbol::intern("x");
        let user = Var::user(sym);
        assert_eq!(user.to_string(), "x");
        let synth = Var::synthetic(7);
        assert_eq!(synth.to_string(), "!7");
        assert_eq!(synth.with_subscript(2).to_string(), "!7!2");
    }

    #[test]
    fn var_type_display_matches_canonical_format() {
        let t = VarType::new(Visibility::Shared, 1, DataType::Int);
        assert_eq!(t.to_string(), "shared[list[int]]");
        let scalar = VarType::new(Visibility::Plaintext, 0, DataType::Bool);
        assert_eq!(scalar.to_string(), "plaintext[bool]");
    }

    #[test]
    fn could_become_respects_unknown_fields() {
        let partial = VarType { visibility: Some(Visibility::Shared), dims: None, datatype: None };
        let full = VarType::new(Visibility::Shared, 0, DataType::Int);
        assert!(partial.could_become(&full));
        assert!(!VarType::new(Visibility::Plaintext, 0, DataType::Int).could_become(&full));
    }

    #[test]
    fn merge_promotes_to_shared() {
        let a = VarType::new(Visibility::Plaintext, 0, DataType::Int);
        let b = VarType::new(Visibility::Shared, 0, DataType::Int);
        let merged = VarType::merge(&[a, b], false).unwrap();
        assert_eq!(merged.visibility, Some(Visibility::Shared));
    }

    #[test]
    fn merge_rejects_dims_mismatch() {
        let a = VarType::new(Visibility::Plaintext, 0, DataType::Int);
        let b = VarType::new(Visibility::Plaintext, 1, DataType::Int);
        assert!(VarType::merge(&[a, b], false).is_err());
    }

    #[test]
    fn merge_allows_mixed_datatypes_when_requested() {
        let a = VarType::new(Visibility::Plaintext, 0, DataType::Int);
        let b = VarType::new(Visibility::Plaintext, 0, DataType::Bool);
        assert!(VarType::merge(&[a, b], true).is_ok());
        assert!(VarType::merge(&[a, b], false).is_err());
    }

    #[test]
    fn drop_and_add_dim_round_trip() {
        let t = VarType::new(Visibility::Shared, 1, DataType::Int);
        let dropped = t.drop_dim();
        assert_eq!(dropped.dims, Some(0));
        assert_eq!(dropped.add_dim().dims, Some(1));
    }

    #[test]
    fn binop_ret_and_operand_datatypes() {
        assert_eq!(BinOpKind::Add.get_ret_datatype(), DataType::Int);
        assert_eq!(BinOpKind::Eq.get_ret_datatype(), DataType::Bool);
        assert_eq!(BinOpKind::Eq.get_operand_datatypes(), &[DataType::Int, DataType::Bool]);
    }
}
