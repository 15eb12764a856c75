//! Formula syntax tree.

use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    String(String),
    Bool(bool),
    Null,
    Undefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    TypeOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    StrictEq,
    StrictNe,
    LooseEq,
    LooseNe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// `function name?(params) { return body; }`
#[derive(Debug, PartialEq)]
pub struct FunctionLiteral {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Ident(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Function(Rc<FunctionLiteral>),
    /// `object.property`
    Member {
        object: Box<Expr>,
        property: String,
    },
    /// `object[index]`
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
}

impl Expr {
    /// Number of nodes on the longest root-to-leaf path, counting function
    /// bodies. Computed with an explicit stack.
    pub fn height(&self) -> usize {
        let mut height = 0;
        let mut stack = vec![(self, 1)];
        while let Some((expr, depth)) = stack.pop() {
            height = height.max(depth);
            expr.for_each_child(|child| stack.push((child, depth + 1)));
        }
        height
    }

    /// Visit the direct children of this node.
    pub fn for_each_child<'a>(&'a self, mut visit: impl FnMut(&'a Expr)) {
        match self {
            Self::Literal(_) | Self::Ident(_) => {}
            Self::Array(items) => items.iter().for_each(visit),
            Self::Object(entries) => entries.iter().for_each(|(_, value)| visit(value)),
            Self::Function(function) => visit(&function.body),
            Self::Member { object, .. } => visit(object),
            Self::Index { object, index } => {
                visit(object);
                visit(index);
            }
            Self::Call { callee, args } | Self::New { callee, args } => {
                visit(callee);
                args.iter().for_each(visit);
            }
            Self::Unary { operand, .. } => visit(operand),
            Self::Binary { left, right, .. } | Self::Logical { left, right, .. } => {
                visit(left);
                visit(right);
            }
            Self::Conditional {
                test,
                consequent,
                alternate,
            } => {
                visit(test);
                visit(consequent);
                visit(alternate);
            }
        }
    }

    /// Short source-like rendering used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Ident(name) => name.clone(),
            Self::Member { object, property } => format!("{}.{}", object.describe(), property),
            Self::Index { object, .. } => format!("{}[...]", object.describe()),
            Self::Call { callee, .. } => format!("{}(...)", callee.describe()),
            Self::Function(function) => function.name.clone().unwrap_or_else(|| "function".to_string()),
            _ => "expression".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Expr {
        Expr::Ident(name.to_string())
    }

    #[test]
    fn height_counts_longest_path() {
        assert_eq!(ident("a").height(), 1);

        let sum = Expr::Binary {
            op: BinaryOp::Add,
            left: Box::new(Expr::Binary {
                op: BinaryOp::Add,
                left: Box::new(ident("a")),
                right: Box::new(ident("b")),
            }),
            right: Box::new(ident("c")),
        };
        assert_eq!(sum.height(), 3);

        let call = Expr::Call {
            callee: Box::new(ident("f")),
            args: vec![sum, ident("d")],
        };
        assert_eq!(call.height(), 4);
    }

    #[test]
    fn height_includes_function_bodies() {
        let function = Expr::Function(Rc::new(FunctionLiteral {
            name: None,
            params: vec!["x".to_string()],
            body: Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(ident("x")),
            },
        }));
        assert_eq!(function.height(), 3);
    }
}
