//! Checked expression tree.
//!
//! Nodes carry a stable 64-bit id assigned by the producing checker, unique
//! within one tree. The tree is immutable once produced; the runtime and the
//! navigable layer only ever borrow it.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Identifier of one expression node, unique within its AST.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct ExprId(pub u64);

impl Display for ExprId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scalar literal payload of a constant node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl Display for Constant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Uint(u) => write!(f, "{u}u"),
            Self::Double(d) => write!(f, "{d:?}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => {
                write!(f, "b\"")?;
                for byte in b {
                    write!(f, "\\x{byte:02x}")?;
                }
                write!(f, "\"")
            }
        }
    }
}

/// One expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub id: ExprId,
    pub kind: ExprKind,
}

/// Kind-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Const(Constant),
    /// Qualified (possibly dotted) name.
    Ident(String),
    Select(Box<SelectExpr>),
    Call(Box<CallExpr>),
    List(ListExpr),
    Map(MapExpr),
    Struct(StructExpr),
    Comprehension(Box<ComprehensionExpr>),
}

/// Field access, or a presence test when `test_only` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectExpr {
    pub operand: Expr,
    pub field: String,
    pub test_only: bool,
}

/// Function invocation.
///
/// Receiver-style calls carry a `target`; free-function calls do not. The
/// candidate overload ids are attached by the external type checker in its
/// preference order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallExpr {
    pub function: String,
    pub target: Option<Expr>,
    pub args: Vec<Expr>,
    pub overload_ids: Vec<String>,
}

/// List construction literal.
///
/// `optional_indices` marks positions whose element expression yields an
/// optional: empty optionals are skipped, full ones contribute their inner
/// value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListExpr {
    pub elements: Vec<Expr>,
    pub optional_indices: Vec<u32>,
}

/// Map construction literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapExpr {
    pub entries: Vec<MapEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapEntry {
    pub key: Expr,
    pub value: Expr,
    pub optional: bool,
}

/// Struct construction literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructExpr {
    pub type_name: String,
    pub fields: Vec<StructField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    pub value: Expr,
    pub optional: bool,
}

/// The single general iteration construct (macro-expanded upstream).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComprehensionExpr {
    pub iter_var: String,
    pub iter_range: Expr,
    pub accu_var: String,
    pub accu_init: Expr,
    pub loop_condition: Expr,
    pub loop_step: Expr,
    pub result: Expr,
}

impl Expr {
    pub fn new(id: ExprId, kind: ExprKind) -> Self {
        Self { id, kind }
    }

    /// Short kind name for diagnostics and dumps.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            ExprKind::Const(_) => "const",
            ExprKind::Ident(_) => "ident",
            ExprKind::Select(_) => "select",
            ExprKind::Call(_) => "call",
            ExprKind::List(_) => "list",
            ExprKind::Map(_) => "map",
            ExprKind::Struct(_) => "struct",
            ExprKind::Comprehension(_) => "comprehension",
        }
    }

    /// Direct children in payload construction order.
    ///
    /// Calls list the receiver before the arguments; map entries list key
    /// then value; comprehensions list iter-range, accu-init,
    /// loop-condition, loop-step, result.
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Const(_) | ExprKind::Ident(_) => Vec::new(),
            ExprKind::Select(select) => vec![&select.operand],
            ExprKind::Call(call) => {
                let mut children = Vec::with_capacity(call.args.len() + 1);
                if let Some(target) = &call.target {
                    children.push(target);
                }
                children.extend(call.args.iter());
                children
            }
            ExprKind::List(list) => list.elements.iter().collect(),
            ExprKind::Map(map) => map
                .entries
                .iter()
                .flat_map(|entry| [&entry.key, &entry.value])
                .collect(),
            ExprKind::Struct(st) => st.fields.iter().map(|field| &field.value).collect(),
            ExprKind::Comprehension(comp) => vec![
                &comp.iter_range,
                &comp.accu_init,
                &comp.loop_condition,
                &comp.loop_step,
                &comp.result,
            ],
        }
    }
}

/// Node factory assigning monotonically increasing ids in creation order.
///
/// Hosts that already have checker-assigned ids construct [`Expr`] values
/// directly instead.
#[derive(Debug, Default)]
pub struct AstBuilder {
    next_id: u64,
}

impl AstBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> ExprId {
        self.next_id += 1;
        ExprId(self.next_id)
    }

    fn node(&mut self, kind: ExprKind) -> Expr {
        Expr::new(self.next_id(), kind)
    }

    pub fn const_null(&mut self) -> Expr {
        self.node(ExprKind::Const(Constant::Null))
    }

    pub fn const_bool(&mut self, value: bool) -> Expr {
        self.node(ExprKind::Const(Constant::Bool(value)))
    }

    pub fn const_int(&mut self, value: i64) -> Expr {
        self.node(ExprKind::Const(Constant::Int(value)))
    }

    pub fn const_uint(&mut self, value: u64) -> Expr {
        self.node(ExprKind::Const(Constant::Uint(value)))
    }

    pub fn const_double(&mut self, value: f64) -> Expr {
        self.node(ExprKind::Const(Constant::Double(value)))
    }

    pub fn const_string(&mut self, value: impl Into<String>) -> Expr {
        self.node(ExprKind::Const(Constant::String(value.into())))
    }

    pub fn const_bytes(&mut self, value: impl Into<Vec<u8>>) -> Expr {
        self.node(ExprKind::Const(Constant::Bytes(value.into())))
    }

    pub fn ident(&mut self, name: impl Into<String>) -> Expr {
        self.node(ExprKind::Ident(name.into()))
    }

    pub fn select(&mut self, operand: Expr, field: impl Into<String>) -> Expr {
        self.node(ExprKind::Select(Box::new(SelectExpr {
            operand,
            field: field.into(),
            test_only: false,
        })))
    }

    /// Test-only select, the expansion of `has(operand.field)`.
    pub fn presence_test(&mut self, operand: Expr, field: impl Into<String>) -> Expr {
        self.node(ExprKind::Select(Box::new(SelectExpr {
            operand,
            field: field.into(),
            test_only: true,
        })))
    }

    pub fn call(&mut self, function: impl Into<String>, args: Vec<Expr>) -> Expr {
        self.node(ExprKind::Call(Box::new(CallExpr {
            function: function.into(),
            target: None,
            args,
            overload_ids: Vec::new(),
        })))
    }

    pub fn call_with_overloads(
        &mut self,
        function: impl Into<String>,
        overload_ids: Vec<String>,
        args: Vec<Expr>,
    ) -> Expr {
        self.node(ExprKind::Call(Box::new(CallExpr {
            function: function.into(),
            target: None,
            args,
            overload_ids,
        })))
    }

    pub fn member_call(
        &mut self,
        target: Expr,
        function: impl Into<String>,
        args: Vec<Expr>,
    ) -> Expr {
        self.node(ExprKind::Call(Box::new(CallExpr {
            function: function.into(),
            target: Some(target),
            args,
            overload_ids: Vec::new(),
        })))
    }

    pub fn list(&mut self, elements: Vec<Expr>) -> Expr {
        self.node(ExprKind::List(ListExpr {
            elements,
            optional_indices: Vec::new(),
        }))
    }

    pub fn list_with_optionals(&mut self, elements: Vec<Expr>, optional_indices: Vec<u32>) -> Expr {
        self.node(ExprKind::List(ListExpr {
            elements,
            optional_indices,
        }))
    }

    /// Entries are (key, value, optional) triples.
    pub fn map(&mut self, entries: Vec<(Expr, Expr, bool)>) -> Expr {
        self.node(ExprKind::Map(MapExpr {
            entries: entries
                .into_iter()
                .map(|(key, value, optional)| MapEntry {
                    key,
                    value,
                    optional,
                })
                .collect(),
        }))
    }

    /// Fields are (name, value, optional) triples.
    pub fn struct_(
        &mut self,
        type_name: impl Into<String>,
        fields: Vec<(String, Expr, bool)>,
    ) -> Expr {
        self.node(ExprKind::Struct(StructExpr {
            type_name: type_name.into(),
            fields: fields
                .into_iter()
                .map(|(name, value, optional)| StructField {
                    name,
                    value,
                    optional,
                })
                .collect(),
        }))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn comprehension(
        &mut self,
        iter_var: impl Into<String>,
        iter_range: Expr,
        accu_var: impl Into<String>,
        accu_init: Expr,
        loop_condition: Expr,
        loop_step: Expr,
        result: Expr,
    ) -> Expr {
        self.node(ExprKind::Comprehension(Box::new(ComprehensionExpr {
            iter_var: iter_var.into(),
            iter_range,
            accu_var: accu_var.into(),
            accu_init,
            loop_condition,
            loop_step,
            result,
        })))
    }
}
