//! JavaScript source printer
//!
//! Produces readable, re-parseable source. Parentheses are inserted from
//! operator precedence, never copied from the input.

use crate::ast::*;

/// Print a whole program
pub fn print_program(program: &Program) -> String {
    let mut p = Printer::new();
    for directive in &program.directives {
        p.line(&format!("{};", quote(directive)));
    }
    for stmt in &program.body {
        p.stmt(stmt);
    }
    p.out
}

/// Print a single statement
pub fn print_statement(stmt: &Stmt) -> String {
    let mut p = Printer::new();
    p.stmt(stmt);
    p.out
}

/// Print an expression on its own
pub fn print_expression(expr: &Expr) -> String {
    let mut p = Printer::new();
    p.expr(expr, 0);
    p.out
}

/// Print a function as an expression (`function f() {}` / `() => {}`)
pub fn print_function(function: &Function) -> String {
    let mut p = Printer::new();
    if function.is_arrow {
        p.arrow(function);
    } else {
        p.function(function);
    }
    p.out
}

/// Format a number the way JavaScript's `Number.prototype.toString()` does
pub fn number_to_js_string(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    let sign = if value < 0.0 { "-" } else { "" };
    let sci = format!("{:e}", value.abs());
    let (mantissa, exponent) = match sci.split_once('e') {
        Some(parts) => parts,
        None => return format!("{}", value),
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let k = digits.len() as i32;
    let n = exponent + 1;

    let body = if k <= n && n <= 21 {
        format!("{}{}", digits, "0".repeat((n - k) as usize))
    } else if 0 < n && n <= 21 {
        let (int, frac) = digits.split_at(n as usize);
        format!("{}.{}", int, frac)
    } else if -6 < n && n <= 0 {
        format!("0.{}{}", "0".repeat((-n) as usize), digits)
    } else {
        let exp_sign = if n - 1 >= 0 { "+" } else { "-" };
        let (first, rest) = digits.split_at(1);
        if rest.is_empty() {
            format!("{}e{}{}", first, exp_sign, (n - 1).abs())
        } else {
            format!("{}.{}e{}{}", first, rest, exp_sign, (n - 1).abs())
        }
    };
    format!("{}{}", sign, body)
}

/// Double-quoted JavaScript string literal
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Whether a string is usable as a bare identifier name
pub fn is_identifier_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c == '$' || c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c == '$' || c.is_alphanumeric())
}

fn template_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '`' => out.push_str("\\`"),
            '\\' => out.push_str("\\\\"),
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

mod prec {
    pub const SEQUENCE: u8 = 1;
    pub const YIELD: u8 = 2;
    pub const ASSIGN: u8 = 3;
    pub const CONDITIONAL: u8 = 4;
    pub const NULLISH: u8 = 5;
    pub const OR: u8 = 5;
    pub const AND: u8 = 6;
    pub const BIT_OR: u8 = 7;
    pub const BIT_XOR: u8 = 8;
    pub const BIT_AND: u8 = 9;
    pub const EQUALITY: u8 = 10;
    pub const RELATIONAL: u8 = 11;
    pub const SHIFT: u8 = 12;
    pub const ADDITIVE: u8 = 13;
    pub const MULTIPLICATIVE: u8 = 14;
    pub const EXPONENT: u8 = 15;
    pub const UNARY: u8 = 16;
    pub const POSTFIX: u8 = 17;
    pub const CALL: u8 = 18;
    pub const PRIMARY: u8 = 20;
}

fn binary_prec(op: BinaryOp) -> u8 {
    use BinaryOp::*;
    match op {
        Add | Sub => prec::ADDITIVE,
        Mul | Div | Mod => prec::MULTIPLICATIVE,
        Exp => prec::EXPONENT,
        Eq | NotEq | StrictEq | StrictNotEq => prec::EQUALITY,
        Lt | LtEq | Gt | GtEq | In | InstanceOf => prec::RELATIONAL,
        BitAnd => prec::BIT_AND,
        BitOr => prec::BIT_OR,
        BitXor => prec::BIT_XOR,
        Shl | Shr | UShr => prec::SHIFT,
    }
}

/// Source spelling of a binary operator
pub fn binary_op_str(op: BinaryOp) -> &'static str {
    use BinaryOp::*;
    match op {
        Add => "+",
        Sub => "-",
        Mul => "*",
        Div => "/",
        Mod => "%",
        Exp => "**",
        Eq => "==",
        NotEq => "!=",
        StrictEq => "===",
        StrictNotEq => "!==",
        Lt => "<",
        LtEq => "<=",
        Gt => ">",
        GtEq => ">=",
        BitAnd => "&",
        BitOr => "|",
        BitXor => "^",
        Shl => "<<",
        Shr => ">>",
        UShr => ">>>",
        In => "in",
        InstanceOf => "instanceof",
    }
}

fn logical_op_str(op: LogicalOp) -> &'static str {
    match op {
        LogicalOp::And => "&&",
        LogicalOp::Or => "||",
        LogicalOp::Nullish => "??",
    }
}

fn expr_prec(expr: &Expr) -> u8 {
    match expr {
        Expr::Sequence(_) => prec::SEQUENCE,
        Expr::Yield { .. } => prec::YIELD,
        Expr::Assign { .. } | Expr::Arrow(_) => prec::ASSIGN,
        Expr::Conditional { .. } => prec::CONDITIONAL,
        Expr::Logical { op, .. } => match op {
            LogicalOp::Nullish => prec::NULLISH,
            LogicalOp::Or => prec::OR,
            LogicalOp::And => prec::AND,
        },
        Expr::Binary { op, .. } => binary_prec(*op),
        Expr::Unary { .. } | Expr::Await(_) => prec::UNARY,
        Expr::Update { prefix: true, .. } => prec::UNARY,
        Expr::Update { prefix: false, .. } => prec::POSTFIX,
        Expr::Lit(Lit::Num(n)) if n.is_sign_negative() => prec::UNARY,
        Expr::Call { .. } | Expr::New { .. } | Expr::Member { .. } | Expr::Chain(_) => prec::CALL,
        Expr::TaggedTemplate { .. } => prec::CALL,
        _ => prec::PRIMARY,
    }
}

struct Printer {
    out: String,
    indent: usize,
}

impl Printer {
    fn new() -> Self {
        Self {
            out: String::new(),
            indent: 0,
        }
    }

    fn pad(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
    }

    fn line(&mut self, text: &str) {
        self.pad();
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn w(&mut self, text: &str) {
        self.out.push_str(text);
    }

    fn block_body(&mut self, stmts: &[Stmt]) {
        self.w("{\n");
        self.indent += 1;
        for stmt in stmts {
            self.stmt(stmt);
        }
        self.indent -= 1;
        self.pad();
        self.w("}");
    }

    fn directives_and_body(&mut self, directives: &[String], stmts: &[Stmt]) {
        self.w("{\n");
        self.indent += 1;
        for directive in directives {
            self.line(&format!("{};", quote(directive)));
        }
        for stmt in stmts {
            self.stmt(stmt);
        }
        self.indent -= 1;
        self.pad();
        self.w("}");
    }

    /// Statement in a nested position (`if` branches, loop bodies)
    fn nested(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(stmts) => {
                self.w(" ");
                self.block_body(stmts);
            }
            other => {
                self.w("\n");
                self.indent += 1;
                self.stmt(other);
                self.indent -= 1;
                self.pad();
            }
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Verbatim(text) => {
                for line in text.lines() {
                    self.line(line);
                }
            }
            Stmt::Block(stmts) => {
                self.pad();
                self.block_body(stmts);
                self.w("\n");
            }
            Stmt::Empty => self.line(";"),
            Stmt::Debugger => self.line("debugger;"),
            Stmt::Expr(expr) => {
                self.pad();
                self.expr_statement(expr);
                self.w(";\n");
            }
            Stmt::VarDecl(decl) => {
                self.pad();
                self.var_decl(decl);
                self.w(";\n");
            }
            Stmt::FunctionDecl(function) => {
                self.pad();
                self.function(function);
                self.w("\n");
            }
            Stmt::ClassDecl(class) => {
                self.pad();
                self.class(class);
                self.w("\n");
            }
            Stmt::Return(arg) => {
                self.pad();
                self.w("return");
                if let Some(expr) = arg {
                    self.w(" ");
                    self.expr(expr, 0);
                }
                self.w(";\n");
            }
            Stmt::Throw(expr) => {
                self.pad();
                self.w("throw ");
                self.expr(expr, 0);
                self.w(";\n");
            }
            Stmt::Break(label) | Stmt::Continue(label) => {
                self.pad();
                self.w(if matches!(stmt, Stmt::Break(_)) { "break" } else { "continue" });
                if let Some(label) = label {
                    self.w(" ");
                    self.w(label);
                }
                self.w(";\n");
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                self.pad();
                self.if_chain(test, consequent, alternate.as_deref());
                self.w("\n");
            }
            Stmt::While { test, body } => {
                self.pad();
                self.w("while (");
                self.expr(test, 0);
                self.w(")");
                self.nested(body);
                self.w("\n");
            }
            Stmt::DoWhile { body, test } => {
                self.pad();
                self.w("do");
                self.nested(body);
                self.w(" while (");
                self.expr(test, 0);
                self.w(");\n");
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                self.pad();
                self.w("for (");
                match init {
                    Some(ForInit::VarDecl(decl)) => self.var_decl(decl),
                    Some(ForInit::Expr(expr)) => self.expr(expr, 0),
                    None => {}
                }
                self.w(";");
                if let Some(test) = test {
                    self.w(" ");
                    self.expr(test, 0);
                }
                self.w(";");
                if let Some(update) = update {
                    self.w(" ");
                    self.expr(update, 0);
                }
                self.w(")");
                self.nested(body);
                self.w("\n");
            }
            Stmt::ForIn { left, right, body } => {
                self.pad();
                self.w("for (");
                self.for_head(left);
                self.w(" in ");
                self.expr(right, 0);
                self.w(")");
                self.nested(body);
                self.w("\n");
            }
            Stmt::ForOf {
                left,
                right,
                body,
                is_await,
            } => {
                self.pad();
                self.w(if *is_await { "for await (" } else { "for (" });
                self.for_head(left);
                self.w(" of ");
                self.expr(right, prec::ASSIGN);
                self.w(")");
                self.nested(body);
                self.w("\n");
            }
            Stmt::Try {
                block,
                handler,
                finalizer,
            } => {
                self.pad();
                self.w("try ");
                self.block_body(block);
                if let Some(handler) = handler {
                    self.w(" catch ");
                    if let Some(param) = &handler.param {
                        self.w("(");
                        self.pattern(param);
                        self.w(") ");
                    }
                    self.block_body(&handler.body);
                }
                if let Some(finalizer) = finalizer {
                    self.w(" finally ");
                    self.block_body(finalizer);
                }
                self.w("\n");
            }
            Stmt::Switch {
                discriminant,
                cases,
            } => {
                self.pad();
                self.w("switch (");
                self.expr(discriminant, 0);
                self.w(") {\n");
                self.indent += 1;
                for case in cases {
                    self.pad();
                    match &case.test {
                        Some(test) => {
                            self.w("case ");
                            self.expr(test, 0);
                            self.w(":\n");
                        }
                        None => self.w("default:\n"),
                    }
                    self.indent += 1;
                    for stmt in &case.consequent {
                        self.stmt(stmt);
                    }
                    self.indent -= 1;
                }
                self.indent -= 1;
                self.line("}");
            }
            Stmt::Labeled { label, body } => {
                self.pad();
                self.w(label);
                self.w(":\n");
                self.stmt(body);
            }
            Stmt::With { object, body } => {
                self.pad();
                self.w("with (");
                self.expr(object, 0);
                self.w(")");
                self.nested(body);
                self.w("\n");
            }
        }
    }

    fn if_chain(&mut self, test: &Expr, consequent: &Stmt, alternate: Option<&Stmt>) {
        self.w("if (");
        self.expr(test, 0);
        self.w(")");
        // Braces keep a dangling `else` attached to the right `if`.
        match consequent {
            Stmt::Block(_) => self.nested(consequent),
            other => {
                self.w(" ");
                self.block_body(std::slice::from_ref(other));
            }
        }
        if let Some(alt) = alternate {
            match alt {
                Stmt::If {
                    test,
                    consequent,
                    alternate,
                } => {
                    self.w(" else ");
                    self.if_chain(test, consequent, alternate.as_deref());
                }
                Stmt::Block(stmts) => {
                    self.w(" else ");
                    self.block_body(stmts);
                }
                other => {
                    self.w(" else ");
                    self.block_body(std::slice::from_ref(other));
                }
            }
        }
    }

    fn for_head(&mut self, head: &ForHead) {
        match head {
            ForHead::VarDecl(kind, pattern) => {
                self.w(kind.as_str());
                self.w(" ");
                self.pattern(pattern);
            }
            ForHead::Pattern(pattern) => self.pattern(pattern),
        }
    }

    fn var_decl(&mut self, decl: &VarDecl) {
        self.w(decl.kind.as_str());
        self.w(" ");
        for (i, d) in decl.declarations.iter().enumerate() {
            if i > 0 {
                self.w(", ");
            }
            self.pattern(&d.id);
            if let Some(init) = &d.init {
                self.w(" = ");
                self.expr(init, prec::ASSIGN);
            }
        }
    }

    fn expr_statement(&mut self, expr: &Expr) {
        let start = self.out.len();
        self.expr(expr, 0);
        let text = &self.out[start..];
        let ambiguous = text.starts_with('{')
            || text.starts_with("function")
            || text.starts_with("async function")
            || text.starts_with("class")
            || text.starts_with("let [");
        if ambiguous {
            self.out.insert(start, '(');
            self.out.push(')');
        }
    }

    fn function(&mut self, function: &Function) {
        if function.is_async {
            self.w("async ");
        }
        self.w("function");
        if function.is_generator {
            self.w("*");
        }
        if let Some(id) = &function.id {
            self.w(" ");
            self.w(id);
        }
        self.params(&function.params);
        self.w(" ");
        self.directives_and_body(&function.directives, &function.body);
    }

    fn params(&mut self, params: &[Pattern]) {
        self.w("(");
        for (i, param) in params.iter().enumerate() {
            if i > 0 {
                self.w(", ");
            }
            self.pattern(param);
        }
        self.w(")");
    }

    fn arrow(&mut self, function: &Function) {
        if function.is_async {
            self.w("async ");
        }
        self.params(&function.params);
        self.w(" => ");
        if let (true, [Stmt::Return(Some(expr))]) = (function.expression_body, function.body.as_slice()) {
            let start = self.out.len();
            self.expr(expr, prec::ASSIGN);
            if self.out[start..].starts_with('{') {
                self.out.insert(start, '(');
                self.out.push(')');
            }
        } else {
            self.directives_and_body(&function.directives, &function.body);
        }
    }

    fn method(&mut self, kind: MethodKind, key: &PropKey, is_static: bool, function: &Function) {
        if is_static {
            self.w("static ");
        }
        match kind {
            MethodKind::Get => self.w("get "),
            MethodKind::Set => self.w("set "),
            MethodKind::Method | MethodKind::Constructor => {
                if function.is_async {
                    self.w("async ");
                }
                if function.is_generator {
                    self.w("*");
                }
            }
        }
        self.prop_key(key);
        self.params(&function.params);
        self.w(" ");
        self.directives_and_body(&function.directives, &function.body);
    }

    fn class(&mut self, class: &Class) {
        self.w("class");
        if let Some(id) = &class.id {
            self.w(" ");
            self.w(id);
        }
        if let Some(sup) = &class.super_class {
            self.w(" extends ");
            self.expr(sup, prec::CALL);
        }
        self.w(" {\n");
        self.indent += 1;
        for member in &class.body {
            self.pad();
            match member {
                ClassMember::Method {
                    kind,
                    key,
                    is_static,
                    function,
                } => self.method(*kind, key, *is_static, function),
                ClassMember::Field {
                    key,
                    is_static,
                    value,
                } => {
                    if *is_static {
                        self.w("static ");
                    }
                    self.prop_key(key);
                    if let Some(value) = value {
                        self.w(" = ");
                        self.expr(value, prec::ASSIGN);
                    }
                    self.w(";");
                }
            }
            self.w("\n");
        }
        self.indent -= 1;
        self.pad();
        self.w("}");
    }

    fn prop_key(&mut self, key: &PropKey) {
        match key {
            PropKey::Ident(name) => self.w(name),
            PropKey::Str(value) => {
                if is_identifier_name(value) {
                    self.w(value);
                } else {
                    self.w(&quote(value));
                }
            }
            PropKey::Num(n) => self.w(&number_to_js_string(*n)),
            PropKey::Computed(expr) => {
                self.w("[");
                self.expr(expr, prec::ASSIGN);
                self.w("]");
            }
        }
    }

    fn pattern(&mut self, pattern: &Pattern) {
        match pattern {
            Pattern::Ident(name) => self.w(name),
            Pattern::Array(items) => {
                self.w("[");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.w(", ");
                    }
                    if let Some(item) = item {
                        self.pattern(item);
                    }
                }
                if matches!(items.last(), Some(None)) {
                    self.w(",");
                }
                self.w("]");
            }
            Pattern::Object(props) => {
                self.w("{");
                for (i, prop) in props.iter().enumerate() {
                    if i > 0 {
                        self.w(", ");
                    }
                    match prop {
                        ObjectPatternProp::KeyValue { key, value } => {
                            let shorthand = match (key, value) {
                                (PropKey::Ident(k), Pattern::Ident(v)) => k == v,
                                (PropKey::Ident(k), Pattern::Assign { target, .. }) => {
                                    target.as_ident() == Some(k.as_str())
                                }
                                _ => false,
                            };
                            if !shorthand {
                                self.prop_key(key);
                                self.w(": ");
                            }
                            self.pattern(value);
                        }
                        ObjectPatternProp::Rest(rest) => {
                            self.w("...");
                            self.pattern(rest);
                        }
                    }
                }
                self.w("}");
            }
            Pattern::Assign { target, default } => {
                self.pattern(target);
                self.w(" = ");
                self.expr(default, prec::ASSIGN);
            }
            Pattern::Rest(inner) => {
                self.w("...");
                self.pattern(inner);
            }
            Pattern::Expr(expr) => self.expr(expr, prec::CALL),
        }
    }

    fn args(&mut self, args: &[ExprOrSpread]) {
        self.w("(");
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.w(", ");
            }
            if arg.spread {
                self.w("...");
            }
            self.expr(&arg.expr, prec::ASSIGN);
        }
        self.w(")");
    }

    fn lit(&mut self, lit: &Lit) {
        match lit {
            Lit::Null => self.w("null"),
            Lit::Bool(b) => self.w(if *b { "true" } else { "false" }),
            Lit::Num(n) => {
                if *n == 0.0 && n.is_sign_negative() {
                    self.w("-0");
                } else {
                    self.w(&number_to_js_string(*n));
                }
            }
            Lit::Str(s) => self.w(&quote(s)),
            Lit::Regex { pattern, flags } => {
                self.w("/");
                self.w(pattern);
                self.w("/");
                self.w(flags);
            }
            Lit::BigInt(digits) => {
                self.w(digits);
                self.w("n");
            }
        }
    }

    fn template(&mut self, quasis: &[String], exprs: &[Expr]) {
        self.w("`");
        for (i, quasi) in quasis.iter().enumerate() {
            self.w(&template_escape(quasi));
            if let Some(expr) = exprs.get(i) {
                self.w("${");
                self.expr(expr, 0);
                self.w("}");
            }
        }
        self.w("`");
    }

    fn expr(&mut self, expr: &Expr, min_prec: u8) {
        let needs_parens = expr_prec(expr) < min_prec;
        if needs_parens {
            self.w("(");
        }
        self.expr_inner(expr);
        if needs_parens {
            self.w(")");
        }
    }

    fn expr_inner(&mut self, expr: &Expr) {
        match expr {
            Expr::Ident(name) => self.w(name),
            Expr::This => self.w("this"),
            Expr::Super => self.w("super"),
            Expr::NewTarget => self.w("new.target"),
            Expr::Lit(lit) => self.lit(lit),
            Expr::Template { quasis, exprs } => self.template(quasis, exprs),
            Expr::TaggedTemplate { tag, quasis, exprs } => {
                self.expr(tag, prec::CALL);
                self.template(quasis, exprs);
            }
            Expr::Array(items) => {
                self.w("[");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.w(", ");
                    }
                    if let Some(item) = item {
                        if item.spread {
                            self.w("...");
                        }
                        self.expr(&item.expr, prec::ASSIGN);
                    }
                }
                if matches!(items.last(), Some(None)) {
                    self.w(",");
                }
                self.w("]");
            }
            Expr::Object(props) => {
                if props.is_empty() {
                    self.w("{}");
                    return;
                }
                self.w("{");
                for (i, prop) in props.iter().enumerate() {
                    self.w(if i > 0 { ", " } else { " " });
                    match prop {
                        ObjectProp::KeyValue { key, value } => {
                            self.prop_key(key);
                            self.w(": ");
                            self.expr(value, prec::ASSIGN);
                        }
                        ObjectProp::Shorthand(name) => self.w(name),
                        ObjectProp::Method {
                            kind,
                            key,
                            function,
                        } => self.method(*kind, key, false, function),
                        ObjectProp::Spread(expr) => {
                            self.w("...");
                            self.expr(expr, prec::ASSIGN);
                        }
                    }
                }
                self.w(" }");
            }
            Expr::Function(function) => self.function(function),
            Expr::Arrow(function) => self.arrow(function),
            Expr::Class(class) => self.class(class),
            Expr::Unary { op, arg } => {
                let word = match op {
                    UnaryOp::Minus => "-",
                    UnaryOp::Plus => "+",
                    UnaryOp::Not => "!",
                    UnaryOp::BitNot => "~",
                    UnaryOp::TypeOf => "typeof ",
                    UnaryOp::Void => "void ",
                    UnaryOp::Delete => "delete ",
                };
                self.w(word);
                let start = self.out.len();
                self.expr(arg, prec::UNARY);
                let clash = match op {
                    UnaryOp::Minus => self.out[start..].starts_with('-'),
                    UnaryOp::Plus => self.out[start..].starts_with('+'),
                    _ => false,
                };
                if clash {
                    self.out.insert(start, ' ');
                }
            }
            Expr::Update { op, prefix, arg } => {
                let sym = match op {
                    UpdateOp::Increment => "++",
                    UpdateOp::Decrement => "--",
                };
                if *prefix {
                    self.w(sym);
                    self.expr(arg, prec::UNARY);
                } else {
                    self.expr(arg, prec::POSTFIX);
                    self.w(sym);
                }
            }
            Expr::Binary { op, left, right } => {
                let p = binary_prec(*op);
                if *op == BinaryOp::Exp {
                    // A unary operand on the left of `**` is a syntax error.
                    self.expr(left, prec::POSTFIX);
                    self.w(" ** ");
                    self.expr(right, p);
                } else {
                    self.expr(left, p);
                    self.w(" ");
                    self.w(binary_op_str(*op));
                    self.w(" ");
                    self.expr(right, p + 1);
                }
            }
            Expr::Logical { op, left, right } => {
                let p = expr_prec(expr);
                // `??` cannot be mixed with `&&`/`||` without parentheses.
                let operand_min = |side: &Expr| match (op, side) {
                    (LogicalOp::Nullish, Expr::Logical { op: inner, .. }) if *inner != LogicalOp::Nullish => {
                        prec::PRIMARY
                    }
                    (LogicalOp::And | LogicalOp::Or, Expr::Logical { op: LogicalOp::Nullish, .. }) => {
                        prec::PRIMARY
                    }
                    _ => 0,
                };
                let left_min = p.max(operand_min(left));
                let right_min = (p + 1).max(operand_min(right));
                self.expr(left, left_min);
                self.w(" ");
                self.w(logical_op_str(*op));
                self.w(" ");
                self.expr(right, right_min);
            }
            Expr::Assign { op, target, value } => {
                self.pattern(target);
                match op {
                    AssignOp::Assign => self.w(" = "),
                    AssignOp::Binary(bin) => {
                        self.w(" ");
                        self.w(binary_op_str(*bin));
                        self.w("= ");
                    }
                    AssignOp::Logical(logical) => {
                        self.w(" ");
                        self.w(logical_op_str(*logical));
                        self.w("= ");
                    }
                }
                self.expr(value, prec::ASSIGN);
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.expr(test, prec::CONDITIONAL + 1);
                self.w(" ? ");
                self.expr(consequent, prec::ASSIGN);
                self.w(" : ");
                self.expr(alternate, prec::ASSIGN);
            }
            Expr::Call {
                callee,
                args,
                optional,
            } => {
                self.callee(callee);
                if *optional {
                    self.w("?.");
                }
                self.args(args);
            }
            Expr::New { callee, args } => {
                self.w("new ");
                if contains_call(callee) {
                    self.w("(");
                    self.expr(callee, 0);
                    self.w(")");
                } else {
                    self.expr(callee, prec::CALL);
                }
                self.args(args);
            }
            Expr::Member {
                object,
                property,
                optional,
            } => {
                self.callee(object);
                match property {
                    MemberProp::Ident(name) => {
                        self.w(if *optional { "?." } else { "." });
                        self.w(name);
                    }
                    MemberProp::Computed(prop) => {
                        if *optional {
                            self.w("?.");
                        }
                        self.w("[");
                        self.expr(prop, 0);
                        self.w("]");
                    }
                }
            }
            Expr::Chain(inner) => self.expr_inner(inner),
            Expr::Sequence(exprs) => {
                for (i, e) in exprs.iter().enumerate() {
                    if i > 0 {
                        self.w(", ");
                    }
                    self.expr(e, prec::ASSIGN);
                }
            }
            Expr::Await(arg) => {
                self.w("await ");
                self.expr(arg, prec::UNARY);
            }
            Expr::Yield { arg, delegate } => {
                self.w(if *delegate { "yield*" } else { "yield" });
                if let Some(arg) = arg {
                    self.w(" ");
                    self.expr(arg, prec::ASSIGN);
                }
            }
        }
    }

    /// Object/callee position of a member access or call
    fn callee(&mut self, expr: &Expr) {
        let wrap = matches!(
            expr,
            Expr::Lit(Lit::Num(_)) | Expr::Function(_) | Expr::Class(_) | Expr::Object(_)
        ) || expr_prec(expr) < prec::CALL;
        if wrap {
            self.w("(");
            self.expr_inner(expr);
            self.w(")");
        } else {
            self.expr_inner(expr);
        }
    }
}

fn contains_call(expr: &Expr) -> bool {
    match expr {
        Expr::Call { .. } => true,
        Expr::Member { object, .. } => contains_call(object),
        Expr::Chain(inner) => contains_call(inner),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_formatting() {
        assert_eq!(number_to_js_string(1.0), "1");
        assert_eq!(number_to_js_string(-2.5), "-2.5");
        assert_eq!(number_to_js_string(0.1), "0.1");
        assert_eq!(number_to_js_string(1e21), "1e+21");
        assert_eq!(number_to_js_string(123456789.0), "123456789");
        assert_eq!(number_to_js_string(1e-7), "1e-7");
        assert_eq!(number_to_js_string(0.000001), "0.000001");
        assert_eq!(number_to_js_string(f64::NAN), "NaN");
        assert_eq!(number_to_js_string(-0.0), "0");
        assert_eq!(number_to_js_string(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_precedence_parens() {
        let e = Expr::binary(
            BinaryOp::Mul,
            Expr::binary(BinaryOp::Add, Expr::ident("a"), Expr::ident("b")),
            Expr::ident("c"),
        );
        assert_eq!(print_expression(&e), "(a + b) * c");

        let e = Expr::binary(
            BinaryOp::Sub,
            Expr::ident("a"),
            Expr::binary(BinaryOp::Sub, Expr::ident("b"), Expr::ident("c")),
        );
        assert_eq!(print_expression(&e), "a - (b - c)");
    }

    #[test]
    fn test_double_negation_is_spaced() {
        let e = Expr::Unary {
            op: UnaryOp::Minus,
            arg: Box::new(Expr::Unary {
                op: UnaryOp::Minus,
                arg: Box::new(Expr::ident("x")),
            }),
        };
        assert_eq!(print_expression(&e), "- -x");
    }

    #[test]
    fn test_optional_chain() {
        let e = Expr::Chain(Box::new(Expr::Call {
            callee: Box::new(Expr::Member {
                object: Box::new(Expr::ident("o")),
                property: MemberProp::Ident("m".into()),
                optional: true,
            }),
            args: vec![],
            optional: false,
        }));
        assert_eq!(print_expression(&e), "o?.m()");
    }

    #[test]
    fn test_statement_starting_with_function_is_wrapped() {
        let stmt = Stmt::Expr(Expr::call(
            Expr::Function(Box::new(Function::default())),
            vec![],
        ));
        assert_eq!(print_statement(&stmt), "(function() {\n})();\n");
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("a\"b\\c\n"), "\"a\\\"b\\\\c\\n\"");
    }

    #[test]
    fn test_program_with_directive() {
        let program = Program {
            directives: vec!["use strict".into()],
            body: vec![Stmt::var("x", Some(Expr::num(1.0)))],
            ..Default::default()
        };
        assert_eq!(print_program(&program), "\"use strict\";\nvar x = 1;\n");
    }
}
