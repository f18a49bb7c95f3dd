//! Syntax tree node definitions

use serde::{Deserialize, Serialize};

/// Whether a program is a classic script or an ES module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SourceType {
    /// Classic script
    #[default]
    Script,
    /// ES module (implicitly strict)
    Module,
}

/// A whole program
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    /// Script or module
    #[serde(default)]
    pub source_type: SourceType,
    /// Directive prologue (`"use strict"` and friends), without quotes
    #[serde(default)]
    pub directives: Vec<String>,
    /// Top-level statements
    pub body: Vec<Stmt>,
}

/// A function, arrow function, or method body
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Function {
    /// Binding name (declarations and named expressions)
    #[serde(default)]
    pub id: Option<String>,
    /// Formal parameters; a trailing [`Pattern::Rest`] is the rest parameter
    #[serde(default)]
    pub params: Vec<Pattern>,
    /// Body statements (an arrow with an expression body holds a single return)
    #[serde(default)]
    pub body: Vec<Stmt>,
    /// Directive prologue of the body
    #[serde(default)]
    pub directives: Vec<String>,
    /// `async function`
    #[serde(default)]
    pub is_async: bool,
    /// `function*`
    #[serde(default)]
    pub is_generator: bool,
    /// `=>` function
    #[serde(default)]
    pub is_arrow: bool,
    /// Arrow whose body was a bare expression
    #[serde(default)]
    pub expression_body: bool,
}

/// A class declaration or expression
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Class {
    /// Class name
    #[serde(default)]
    pub id: Option<String>,
    /// `extends` clause
    #[serde(default)]
    pub super_class: Option<Box<Expr>>,
    /// Members in source order
    #[serde(default)]
    pub body: Vec<ClassMember>,
}

/// Kind of a method definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodKind {
    /// Class constructor
    Constructor,
    /// Plain method
    Method,
    /// `get` accessor
    Get,
    /// `set` accessor
    Set,
}

/// A class body member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClassMember {
    /// Method, accessor or constructor
    Method {
        /// Method kind
        kind: MethodKind,
        /// Member key
        key: PropKey,
        /// `static` member
        is_static: bool,
        /// Method function
        function: Function,
    },
    /// Instance or static field
    Field {
        /// Field key
        key: PropKey,
        /// `static` field
        is_static: bool,
        /// Initializer
        value: Option<Expr>,
    },
}

/// Statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// Expression statement
    Expr(Expr),
    /// `var`/`let`/`const` declaration
    VarDecl(VarDecl),
    /// Function declaration
    FunctionDecl(Function),
    /// Class declaration
    ClassDecl(Class),
    /// `return`
    Return(Option<Expr>),
    /// `if`
    If {
        /// Condition
        test: Expr,
        /// Then branch
        consequent: Box<Stmt>,
        /// Else branch
        alternate: Option<Box<Stmt>>,
    },
    /// `{ ... }`
    Block(Vec<Stmt>),
    /// `while`
    While {
        /// Condition
        test: Expr,
        /// Body
        body: Box<Stmt>,
    },
    /// `do ... while`
    DoWhile {
        /// Body
        body: Box<Stmt>,
        /// Condition
        test: Expr,
    },
    /// C-style `for`
    For {
        /// Initializer
        init: Option<ForInit>,
        /// Condition
        test: Option<Expr>,
        /// Update expression
        update: Option<Expr>,
        /// Body
        body: Box<Stmt>,
    },
    /// `for (x in o)`
    ForIn {
        /// Loop target
        left: ForHead,
        /// Enumerated object
        right: Expr,
        /// Body
        body: Box<Stmt>,
    },
    /// `for (x of it)` / `for await (x of it)`
    ForOf {
        /// Loop target
        left: ForHead,
        /// Iterated value
        right: Expr,
        /// Body
        body: Box<Stmt>,
        /// `for await`
        is_await: bool,
    },
    /// `break [label]`
    Break(Option<String>),
    /// `continue [label]`
    Continue(Option<String>),
    /// `throw`
    Throw(Expr),
    /// `try`
    Try {
        /// Protected block
        block: Vec<Stmt>,
        /// `catch` clause
        handler: Option<CatchClause>,
        /// `finally` block
        finalizer: Option<Vec<Stmt>>,
    },
    /// `switch`
    Switch {
        /// Switched value
        discriminant: Expr,
        /// Cases in source order
        cases: Vec<SwitchCase>,
    },
    /// `label: stmt`
    Labeled {
        /// Label name
        label: String,
        /// Labeled statement
        body: Box<Stmt>,
    },
    /// `with (o) stmt`
    With {
        /// Scope object
        object: Expr,
        /// Body
        body: Box<Stmt>,
    },
    /// `;`
    Empty,
    /// `debugger`
    Debugger,
    /// Pre-rendered source inserted by a pass; printed unchanged
    Verbatim(String),
}

/// Declaration keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKind {
    /// `var`
    Var,
    /// `let`
    Let,
    /// `const`
    Const,
}

impl VarKind {
    /// Source keyword
    pub fn as_str(self) -> &'static str {
        match self {
            VarKind::Var => "var",
            VarKind::Let => "let",
            VarKind::Const => "const",
        }
    }

    /// `let` or `const`
    pub fn is_block_scoped(self) -> bool {
        !matches!(self, VarKind::Var)
    }
}

/// A declaration statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDecl {
    /// Keyword
    pub kind: VarKind,
    /// Declarators
    pub declarations: Vec<VarDeclarator>,
}

/// One `id = init` of a declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDeclarator {
    /// Bound pattern
    pub id: Pattern,
    /// Initializer
    pub init: Option<Expr>,
}

/// Initializer slot of a `for` statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ForInit {
    /// Declaration
    VarDecl(VarDecl),
    /// Expression
    Expr(Expr),
}

/// Left side of `for-in`/`for-of`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ForHead {
    /// `for (let x of ...)`
    VarDecl(VarKind, Pattern),
    /// `for (x of ...)`
    Pattern(Pattern),
}

/// `catch (param) { body }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchClause {
    /// Bound exception (optional catch binding when absent)
    pub param: Option<Pattern>,
    /// Handler body
    pub body: Vec<Stmt>,
}

/// `case test:` or `default:`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    /// `None` for `default`
    pub test: Option<Expr>,
    /// Statements up to the next case
    pub consequent: Vec<Stmt>,
}

/// Binding or assignment target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Pattern {
    /// Identifier
    Ident(String),
    /// `[a, , b, ...rest]`
    Array(Vec<Option<Pattern>>),
    /// `{a, b: c, ...rest}`
    Object(Vec<ObjectPatternProp>),
    /// `target = default`
    Assign {
        /// Bound target
        target: Box<Pattern>,
        /// Default value
        default: Box<Expr>,
    },
    /// `...target` (arrays and parameter lists)
    Rest(Box<Pattern>),
    /// Arbitrary member expression target (assignments and `for` heads)
    Expr(Box<Expr>),
}

/// Property of an object pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObjectPatternProp {
    /// `key: value`
    KeyValue {
        /// Source key
        key: PropKey,
        /// Bound value
        value: Pattern,
    },
    /// `...rest`
    Rest(Pattern),
}

/// Property key in literals, patterns and classes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropKey {
    /// Identifier name
    Ident(String),
    /// String literal key
    Str(String),
    /// Numeric key
    Num(f64),
    /// `[expr]`
    Computed(Box<Expr>),
}

impl PropKey {
    /// The key as a property name when it is statically known
    pub fn static_name(&self) -> Option<String> {
        match self {
            PropKey::Ident(name) | PropKey::Str(name) => Some(name.clone()),
            PropKey::Num(n) => Some(crate::printer::number_to_js_string(*n)),
            PropKey::Computed(_) => None,
        }
    }
}

/// Literal value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Lit {
    /// `null`
    Null,
    /// `true`/`false`
    Bool(bool),
    /// Number
    Num(f64),
    /// String (cooked)
    Str(String),
    /// `/pattern/flags`
    Regex {
        /// Pattern body
        pattern: String,
        /// Flags
        flags: String,
    },
    /// `123n` (digits without suffix)
    BigInt(String),
}

/// Array literal element or call argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExprOrSpread {
    /// Preceded by `...`
    #[serde(default)]
    pub spread: bool,
    /// Element value
    pub expr: Expr,
}

/// Object literal property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObjectProp {
    /// `key: value`
    KeyValue {
        /// Key
        key: PropKey,
        /// Value
        value: Expr,
    },
    /// `{ x }`
    Shorthand(String),
    /// Method or accessor
    Method {
        /// Method kind
        kind: MethodKind,
        /// Key
        key: PropKey,
        /// Function
        function: Function,
    },
    /// `...expr`
    Spread(Expr),
}

/// Property access of a member expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MemberProp {
    /// `.name`
    Ident(String),
    /// `[expr]`
    Computed(Box<Expr>),
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// `-`
    Minus,
    /// `+`
    Plus,
    /// `!`
    Not,
    /// `~`
    BitNot,
    /// `typeof`
    TypeOf,
    /// `void`
    Void,
    /// `delete`
    Delete,
}

/// `++` / `--`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateOp {
    /// `++`
    Increment,
    /// `--`
    Decrement,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `**`
    Exp,
    /// `==`
    Eq,
    /// `!=`
    NotEq,
    /// `===`
    StrictEq,
    /// `!==`
    StrictNotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `>>>`
    UShr,
    /// `in`
    In,
    /// `instanceof`
    InstanceOf,
}

/// Short-circuit operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    /// `&&`
    And,
    /// `||`
    Or,
    /// `??`
    Nullish,
}

/// Assignment operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    /// `=`
    Assign,
    /// `op=` for a binary operator
    Binary(BinaryOp),
    /// `&&=`, `||=`, `??=`
    Logical(LogicalOp),
}

/// Expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Identifier reference
    Ident(String),
    /// `this`
    This,
    /// `super` (only as a callee or member object)
    Super,
    /// `new.target`
    NewTarget,
    /// Literal
    Lit(Lit),
    /// Template literal with cooked quasis (`quasis.len() == exprs.len() + 1`)
    Template {
        /// String parts
        quasis: Vec<String>,
        /// Interpolated expressions
        exprs: Vec<Expr>,
    },
    /// Tagged template
    TaggedTemplate {
        /// Tag function
        tag: Box<Expr>,
        /// String parts
        quasis: Vec<String>,
        /// Interpolated expressions
        exprs: Vec<Expr>,
    },
    /// `[a, , b]`
    Array(Vec<Option<ExprOrSpread>>),
    /// `{...}`
    Object(Vec<ObjectProp>),
    /// `function` expression
    Function(Box<Function>),
    /// Arrow function
    Arrow(Box<Function>),
    /// `class` expression
    Class(Box<Class>),
    /// Prefix unary
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        arg: Box<Expr>,
    },
    /// `++`/`--`
    Update {
        /// Operator
        op: UpdateOp,
        /// Prefix form
        prefix: bool,
        /// Target (identifier or member)
        arg: Box<Expr>,
    },
    /// Binary operation
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// `&&`, `||`, `??`
    Logical {
        /// Operator
        op: LogicalOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// Assignment
    Assign {
        /// Operator
        op: AssignOp,
        /// Target
        target: Box<Pattern>,
        /// Assigned value
        value: Box<Expr>,
    },
    /// `test ? consequent : alternate`
    Conditional {
        /// Condition
        test: Box<Expr>,
        /// Then value
        consequent: Box<Expr>,
        /// Else value
        alternate: Box<Expr>,
    },
    /// Call (`optional` for `f?.()`)
    Call {
        /// Callee
        callee: Box<Expr>,
        /// Arguments
        args: Vec<ExprOrSpread>,
        /// `?.()`
        #[serde(default)]
        optional: bool,
    },
    /// `new C(args)`
    New {
        /// Constructor
        callee: Box<Expr>,
        /// Arguments
        args: Vec<ExprOrSpread>,
    },
    /// Property access (`optional` for `o?.p`)
    Member {
        /// Object
        object: Box<Expr>,
        /// Property
        property: MemberProp,
        /// `?.`
        #[serde(default)]
        optional: bool,
    },
    /// Boundary of an optional chain
    Chain(Box<Expr>),
    /// Comma expression
    Sequence(Vec<Expr>),
    /// `await`
    Await(Box<Expr>),
    /// `yield` / `yield*`
    Yield {
        /// Yielded value
        arg: Option<Box<Expr>>,
        /// `yield*`
        delegate: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_from_json_with_defaults() {
        let json = r#"{
            "body": [{"FunctionDecl": {
                "id": "add",
                "params": [{"Ident": "a"}, {"Ident": "b"}],
                "body": [{"Return": {"Binary": {"op": "Add", "left": {"Ident": "a"}, "right": {"Ident": "b"}}}}]
            }}]
        }"#;
        let program: Program = serde_json::from_str(json).unwrap();
        assert_eq!(program.source_type, SourceType::Script);
        let Stmt::FunctionDecl(function) = &program.body[0] else {
            panic!("expected a function declaration");
        };
        assert_eq!(function.id.as_deref(), Some("add"));
        assert!(!function.is_async && !function.is_arrow);
        assert!(crate::print_program(&program).contains("return a + b"));
    }

    #[test]
    fn test_unknown_node_is_rejected() {
        let json = r#"{"body": [{"Goto": "label"}]}"#;
        assert!(serde_json::from_str::<Program>(json).is_err());
    }
}
