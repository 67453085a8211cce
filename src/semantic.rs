//! # Per-module semantic analysis
//!
//! Symbol-table construction and type resolution/checking — the part of
//! the orchestrator's per-module pipeline (§4.2 step 4) that runs before IL
//! generation. Not one of the ten lettered components on its own; it is the
//! glue between C1 (the type/symbol model) and C4 (the IL builder), and
//! lives in its own file because it's substantial enough to clutter
//! `orchestrator.rs` otherwise.

use crate::ast::{AstDecl, AstExpr, AstExprKind, AstFunctionDecl, AstLValue, AstModule, AstStmt, AstVarDecl, BinaryOp, UnaryOp};
use crate::error::SemanticError;
use crate::types::{GlobalSymbolTable, MemoryMapping, Symbol, SymbolKind, SymbolTable, Type};

/// Result of analyzing one module: its local symbol table (ready to be
/// merged into the `GlobalSymbolTable`) plus any diagnostics. Diagnostics
/// do not necessarily mean `decls` is unusable — callers should check
/// `errors.is_empty()` before proceeding to IL generation for this module,
/// per §4.2's "per-module semantic diagnostics do not abort other modules"
/// policy (the orchestrator enforces that; this function just reports).
pub struct AnalyzedModule {
    /// The module's local symbol table.
    pub symbols: SymbolTable,
    /// Diagnostics collected while analyzing this module.
    pub errors: Vec<SemanticError>,
}

/// A lexical scope during statement/expression analysis: function
/// parameters plus block-local `let`s, innermost last.
struct Scope<'a> {
    frames: Vec<std::collections::HashMap<String, Type>>,
    module_name: &'a str,
    local_symbols: &'a SymbolTable,
    global_symbols: &'a GlobalSymbolTable,
}

impl<'a> Scope<'a> {
    fn new(module_name: &'a str, local_symbols: &'a SymbolTable, global_symbols: &'a GlobalSymbolTable) -> Self {
        Self {
            frames: vec![std::collections::HashMap::new()],
            module_name,
            local_symbols,
            global_symbols,
        }
    }

    fn push(&mut self) {
        self.frames.push(std::collections::HashMap::new());
    }

    fn pop(&mut self) {
        self.frames.pop();
    }

    fn declare(&mut self, name: &str, ty: Type) {
        self.frames.last_mut().unwrap().insert(name.to_string(), ty);
    }

    fn resolve(&self, name: &str) -> Option<Type> {
        for frame in self.frames.iter().rev() {
            if let Some(ty) = frame.get(name) {
                return Some(ty.clone());
            }
        }
        if let Some(sym) = self.local_symbols.get(name) {
            return Some(sym.ty.clone());
        }
        self.global_symbols.lookup(name, self.module_name).map(|s| s.ty.clone())
    }
}

/// Analyze one module: build its symbol table and fill every expression's
/// `ty` field in place.
pub fn analyze_module(module: &mut AstModule, global: &GlobalSymbolTable) -> AnalyzedModule {
    let mut symbols = SymbolTable::new();
    let mut errors = Vec::new();

    // Pass 1: declare every top-level name so forward references (mutual
    // calls, a `const` used before its textual declaration) resolve.
    for decl in &module.decls {
        match decl {
            AstDecl::Variable(v) => {
                if let Some(sym) = predeclare_variable(v, &module.name, &mut errors) {
                    symbols.insert(sym);
                }
            }
            AstDecl::MemoryMap(m) => {
                symbols.insert(Symbol {
                    name: m.name.clone(),
                    kind: SymbolKind::MemoryMap,
                    ty: m.ty.clone(),
                    storage: crate::types::StorageClass::Map,
                    mapping: Some(m.mapping.clone()),
                    exported: m.exported,
                    module: module.name.clone(),
                });
            }
            AstDecl::Function(f) => {
                symbols.insert(Symbol::new(
                    f.name.clone(),
                    SymbolKind::Function,
                    Type::Function {
                        params: f.params.iter().map(|(_, t)| t.clone()).collect(),
                        ret: Box::new(f.return_ty.clone()),
                    },
                    crate::types::StorageClass::Default,
                    module.name.clone(),
                    f.exported,
                ));
            }
        }
    }

    // Pass 2: type-check bodies and initializers, filling in expression types.
    for decl in &mut module.decls {
        match decl {
            AstDecl::Variable(v) => {
                let mut scope = Scope::new(&module.name, &symbols, global);
                check_var_decl(v, &mut scope, &mut errors);
            }
            AstDecl::MemoryMap(_) => {}
            AstDecl::Function(f) => {
                check_function(f, &symbols, global, &mut errors);
            }
        }
    }

    AnalyzedModule { symbols, errors }
}

fn predeclare_variable(v: &AstVarDecl, module: &str, errors: &mut Vec<SemanticError>) -> Option<Symbol> {
    let kind = if v.is_const {
        SymbolKind::Const
    } else {
        SymbolKind::Variable
    };

    let ty = match infer_declared_type(v, errors) {
        Some(t) => t,
        None => return None,
    };

    Some(Symbol::new(v.name.clone(), kind, ty, v.storage, module, v.exported))
}

/// Resolve a declaration's type, performing array-size inference (§4.1)
/// when the declared type has empty brackets.
fn infer_declared_type(v: &AstVarDecl, errors: &mut Vec<SemanticError>) -> Option<Type> {
    match &v.declared_ty {
        Some(Type::Array { element, size: None }) => {
            match &v.init {
                None => {
                    errors.push(SemanticError::ArraySizeInference {
                        reason: "no initializer provided",
                        location: v.location.clone(),
                    });
                    None
                }
                Some(init) => match &init.kind {
                    AstExprKind::ArrayLiteral(elems) => {
                        if elems.is_empty() {
                            errors.push(SemanticError::ArraySizeInference {
                                reason: "empty array literal",
                                location: v.location.clone(),
                            });
                            None
                        } else {
                            Some(Type::Array {
                                element: element.clone(),
                                size: Some(elems.len() as u32),
                            })
                        }
                    }
                    _ => {
                        errors.push(SemanticError::ArraySizeInference {
                            reason: "non-literal initializer",
                            location: v.location.clone(),
                        });
                        None
                    }
                },
            }
        }
        Some(other) => Some(other.clone()),
        None => {
            // No declared type at all: infer from the initializer's shape
            // where possible, otherwise default to word-sized literal
            // inference downstream.
            None
        }
    }
}

fn check_var_decl(v: &mut AstVarDecl, scope: &mut Scope, errors: &mut Vec<SemanticError>) {
    let expected = v.declared_ty.clone();
    if let Some(init) = &mut v.init {
        infer_expr_type(init, expected.as_ref(), scope, errors);
        if let (Some(declared), Some(found)) = (&v.declared_ty, &init.ty) {
            check_assignable(found, declared, &init.location, errors);
        }
    }
    if v.declared_ty.is_none() {
        if let Some(init) = &v.init {
            v.declared_ty = init.ty.clone();
        }
    }
}

fn check_function(
    f: &mut AstFunctionDecl,
    symbols: &SymbolTable,
    global: &GlobalSymbolTable,
    errors: &mut Vec<SemanticError>,
) {
    let owning_module = symbols
        .get(&f.name)
        .map(|s| s.module.clone())
        .unwrap_or_default();

    let mut scope = Scope::new(&owning_module, symbols, global);
    scope.push();
    for (name, ty) in &f.params {
        scope.declare(name, ty.clone());
    }
    check_block(&mut f.body, &f.return_ty, &mut scope, errors);
    scope.pop();
}

fn check_block(stmts: &mut [AstStmt], return_ty: &Type, scope: &mut Scope, errors: &mut Vec<SemanticError>) {
    for stmt in stmts {
        check_stmt(stmt, return_ty, scope, errors);
    }
}

fn check_stmt(stmt: &mut AstStmt, return_ty: &Type, scope: &mut Scope, errors: &mut Vec<SemanticError>) {
    match stmt {
        AstStmt::Let(v) => {
            // Reuse top-level inference, then bind into the local scope.
            let expected = v.declared_ty.clone();
            if let Some(init) = &mut v.init {
                infer_expr_type(init, expected.as_ref(), scope, errors);
            }
            if v.declared_ty.is_none() {
                if let Some(init) = &v.init {
                    v.declared_ty = init.ty.clone();
                }
            } else if let (Some(declared), Some(init)) = (&v.declared_ty, &v.init) {
                if let Some(found) = &init.ty {
                    check_assignable(found, declared, &init.location, errors);
                }
            }
            if let Some(ty) = v.declared_ty.clone() {
                scope.declare(&v.name, ty);
            }
        }
        AstStmt::Assign { target, value, location } => {
            infer_expr_type(value, None, scope, errors);
            let target_ty = match target {
                AstLValue::Variable(name) => scope.resolve(name),
                AstLValue::ArrayElement { array, index } => {
                    infer_expr_type(index, None, scope, errors);
                    match scope.resolve(array) {
                        Some(Type::Array { element, .. }) => Some(*element),
                        _ => None,
                    }
                }
            };
            if let (Some(target_ty), Some(found)) = (target_ty, &value.ty) {
                check_assignable(found, &target_ty, location, errors);
            }
        }
        AstStmt::ExprStmt(expr) => {
            infer_expr_type(expr, None, scope, errors);
        }
        AstStmt::If {
            cond,
            then_branch,
            else_branch,
            ..
        } => {
            infer_expr_type(cond, Some(&Type::Bool), scope, errors);
            scope.push();
            check_block(then_branch, return_ty, scope, errors);
            scope.pop();
            scope.push();
            check_block(else_branch, return_ty, scope, errors);
            scope.pop();
        }
        AstStmt::While { cond, body, .. } => {
            infer_expr_type(cond, Some(&Type::Bool), scope, errors);
            scope.push();
            check_block(body, return_ty, scope, errors);
            scope.pop();
        }
        AstStmt::ForRange {
            var,
            start,
            end,
            body,
            ..
        } => {
            infer_expr_type(start, Some(&Type::Word), scope, errors);
            infer_expr_type(end, Some(&Type::Word), scope, errors);
            scope.push();
            let induction_ty = start.ty.clone().unwrap_or(Type::Word);
            scope.declare(var, induction_ty);
            check_block(body, return_ty, scope, errors);
            scope.pop();
        }
        AstStmt::Return { value, location } => match value {
            Some(expr) => {
                infer_expr_type(expr, Some(return_ty), scope, errors);
                if let Some(found) = &expr.ty {
                    check_assignable(found, return_ty, location, errors);
                }
            }
            None => {
                if *return_ty != Type::Void {
                    errors.push(SemanticError::TypeMismatch {
                        expected: return_ty.to_string(),
                        found: Type::Void.to_string(),
                        location: location.clone(),
                    });
                }
            }
        },
        AstStmt::Break(_) | AstStmt::Continue(_) => {}
    }
}

fn check_assignable(
    found: &Type,
    target: &Type,
    location: &crate::types::SourceLocation,
    errors: &mut Vec<SemanticError>,
) {
    if found == target || found.implicitly_convertible_to(target) {
        return;
    }
    if found.narrows_to(target) {
        errors.push(SemanticError::NarrowingWithoutCast {
            from: found.to_string(),
            to: target.to_string(),
            location: location.clone(),
        });
    } else {
        errors.push(SemanticError::TypeMismatch {
            expected: target.to_string(),
            found: found.to_string(),
            location: location.clone(),
        });
    }
}

/// Bottom-up type inference over an expression tree, writing the result
/// into `expr.ty`. `expected` is a hint used only for literal sizing
/// (§4.4: "100 in a byte context selects byte for the CONST").
fn infer_expr_type(expr: &mut AstExpr, expected: Option<&Type>, scope: &mut Scope, errors: &mut Vec<SemanticError>) {
    let ty = match &mut expr.kind {
        AstExprKind::IntLiteral(value) => match literal_type(*value, expected) {
            Some(t) => Some(t),
            None => {
                errors.push(SemanticError::LiteralOutOfRange {
                    value: *value,
                    location: expr.location.clone(),
                });
                None
            }
        },
        AstExprKind::BoolLiteral(_) => Some(Type::Bool),
        AstExprKind::ArrayLiteral(elems) => {
            let elem_expected = match expected {
                Some(Type::Array { element, .. }) => Some((**element).clone()),
                _ => None,
            };
            let count = elems.len() as u32;
            let mut elem_ty: Option<Type> = elem_expected.clone();
            for e in elems.iter_mut() {
                infer_expr_type(e, elem_expected.as_ref(), scope, errors);
                if elem_ty.is_none() {
                    elem_ty = e.ty.clone();
                }
            }
            elem_ty.map(|t| Type::Array {
                element: Box::new(t),
                size: Some(count),
            })
        }
        AstExprKind::Identifier(name) => match scope.resolve(name) {
            Some(t) => Some(t),
            None => {
                errors.push(SemanticError::UnresolvedName {
                    name: name.clone(),
                    location: expr.location.clone(),
                });
                None
            }
        },
        AstExprKind::ArrayIndex { array, index } => {
            infer_expr_type(array, None, scope, errors);
            infer_expr_type(index, Some(&Type::Word), scope, errors);
            match &array.ty {
                Some(Type::Array { element, .. }) => Some((**element).clone()),
                _ => None,
            }
        }
        AstExprKind::Binary { op, lhs, rhs } => {
            infer_expr_type(lhs, None, scope, errors);
            infer_expr_type(rhs, expected_for_binary_rhs(*op, &lhs.ty), scope, errors);
            binary_result_type(*op, &lhs.ty, &rhs.ty)
        }
        AstExprKind::Unary { op, operand } => {
            infer_expr_type(operand, expected, scope, errors);
            match op {
                UnaryOp::LogicalNot => Some(Type::Bool),
                UnaryOp::Neg | UnaryOp::Not => operand.ty.clone(),
            }
        }
        AstExprKind::Call { callee, args } => {
            let sig = scope.resolve(callee);
            if sig.is_none() {
                errors.push(SemanticError::UnresolvedName {
                    name: callee.clone(),
                    location: expr.location.clone(),
                });
            }
            let param_tys: Option<Vec<Type>> = match &sig {
                Some(Type::Function { params, .. }) => Some(params.clone()),
                _ => None,
            };
            for (i, a) in args.iter_mut().enumerate() {
                let hint = param_tys.as_ref().and_then(|p| p.get(i));
                infer_expr_type(a, hint, scope, errors);
            }
            match sig {
                Some(Type::Function { ret, .. }) => Some(*ret),
                _ => None,
            }
        }
        AstExprKind::AddressOf(name) => {
            if scope.resolve(name).is_none() {
                errors.push(SemanticError::UnresolvedName {
                    name: name.clone(),
                    location: expr.location.clone(),
                });
            }
            Some(Type::Word)
        }
        AstExprKind::Peek { addr, wide } => {
            infer_expr_type(addr, Some(&Type::Word), scope, errors);
            Some(if *wide { Type::Word } else { Type::Byte })
        }
        AstExprKind::Poke { addr, value, wide } => {
            infer_expr_type(addr, Some(&Type::Word), scope, errors);
            infer_expr_type(value, Some(if *wide { &Type::Word } else { &Type::Byte }), scope, errors);
            Some(Type::Void)
        }
        AstExprKind::CpuOp(_) => Some(Type::Void),
    };
    expr.ty = ty;
}

fn literal_type(value: i64, expected: Option<&Type>) -> Option<Type> {
    if !(0..=0xFFFF).contains(&value) {
        return None;
    }
    match expected {
        Some(Type::Byte) if value <= 0xFF => Some(Type::Byte),
        Some(Type::Word) => Some(Type::Word),
        Some(Type::Bool) if value == 0 || value == 1 => Some(Type::Bool),
        _ => Type::smallest_integer_type_for(value),
    }
}

fn expected_for_binary_rhs(op: BinaryOp, lhs_ty: &Option<Type>) -> Option<&Type> {
    let _ = op;
    lhs_ty.as_ref()
}

fn binary_result_type(op: BinaryOp, lhs: &Option<Type>, rhs: &Option<Type>) -> Option<Type> {
    use BinaryOp::*;
    match op {
        Eq | Ne | Lt | Le | Gt | Ge => Some(Type::Bool),
        Add | Sub | Mul | Div | Mod | And | Or | Xor | Shl | Shr => match (lhs, rhs) {
            (Some(Type::Word), _) | (_, Some(Type::Word)) => Some(Type::Word),
            (Some(l), Some(_)) => Some(l.clone()),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;
    use crate::types::SourceLocation;

    fn loc() -> SourceLocation {
        SourceLocation::new("test.6502", 1, 1)
    }

    fn int_lit(v: i64) -> AstExpr {
        AstExpr {
            kind: AstExprKind::IntLiteral(v),
            ty: None,
            location: loc(),
        }
    }

    #[test]
    fn array_size_inferred_from_literal_initializer() {
        let decl = AstVarDecl {
            name: "xs".into(),
            declared_ty: Some(Type::Array {
                element: Box::new(Type::Byte),
                size: None,
            }),
            init: Some(AstExpr {
                kind: AstExprKind::ArrayLiteral(vec![int_lit(1), int_lit(2), int_lit(3)]),
                ty: None,
                location: loc(),
            }),
            is_const: false,
            storage: crate::types::StorageClass::Default,
            exported: false,
            location: loc(),
        };
        let mut errors = Vec::new();
        let ty = infer_declared_type(&decl, &mut errors);
        assert!(errors.is_empty());
        assert_eq!(
            ty,
            Some(Type::Array {
                element: Box::new(Type::Byte),
                size: Some(3)
            })
        );
    }

    #[test]
    fn array_size_inference_errors() {
        let no_init = AstVarDecl {
            name: "xs".into(),
            declared_ty: Some(Type::Array {
                element: Box::new(Type::Byte),
                size: None,
            }),
            init: None,
            is_const: false,
            storage: crate::types::StorageClass::Default,
            exported: false,
            location: loc(),
        };
        let mut errors = Vec::new();
        assert!(infer_declared_type(&no_init, &mut errors).is_none());
        assert!(matches!(
            errors[0],
            SemanticError::ArraySizeInference {
                reason: "no initializer provided",
                ..
            }
        ));

        let non_literal = AstVarDecl {
            init: Some(AstExpr {
                kind: AstExprKind::Identifier("other".into()),
                ty: None,
                location: loc(),
            }),
            ..AstVarDecl {
                name: "xs".into(),
                declared_ty: Some(Type::Array {
                    element: Box::new(Type::Byte),
                    size: None,
                }),
                init: None,
                is_const: false,
                storage: crate::types::StorageClass::Default,
                exported: false,
                location: loc(),
            }
        };
        let mut errors2 = Vec::new();
        assert!(infer_declared_type(&non_literal, &mut errors2).is_none());
        assert!(matches!(
            errors2[0],
            SemanticError::ArraySizeInference {
                reason: "non-literal initializer",
                ..
            }
        ));
    }

    #[test]
    fn module_analysis_fills_expression_types() {
        let mut module = AstModule {
            name: "M".into(),
            imports: vec![],
            source_file: "m.6502".into(),
            decls: vec![AstDecl::Function(AstFunctionDecl {
                name: "main".into(),
                params: vec![],
                return_ty: Type::Void,
                body: vec![AstStmt::Let(AstVarDecl {
                    name: "x".into(),
                    declared_ty: Some(Type::Byte),
                    init: Some(int_lit(42)),
                    is_const: false,
                    storage: crate::types::StorageClass::Default,
                    exported: false,
                    location: loc(),
                })],
                exported: true,
                location: loc(),
            })],
        };
        let global = GlobalSymbolTable::new();
        let result = analyze_module(&mut module, &global);
        assert!(result.errors.is_empty());
        if let AstDecl::Function(f) = &module.decls[0] {
            if let AstStmt::Let(v) = &f.body[0] {
                assert_eq!(v.init.as_ref().unwrap().ty, Some(Type::Byte));
            } else {
                panic!("expected let");
            }
        }
    }
}
