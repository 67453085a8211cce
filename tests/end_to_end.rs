//! End-to-end scenarios (spec §8's test-suite seed list), driven through
//! the top-level `Compiler`/`Orchestrator` façade rather than any one
//! module in isolation.

use sixtyfive_core::ast::{
    AstDecl, AstExpr, AstExprKind, AstFunctionDecl, AstModule, AstStmt, BinaryOp,
};
use sixtyfive_core::orchestrator::Orchestrator;
use sixtyfive_core::types::{SourceLocation, Type};
use sixtyfive_core::{Architecture, Compiler, CompilerOptions, ExitCode};

fn loc() -> SourceLocation {
    SourceLocation::new("e2e.6502", 1, 1)
}

fn void_main(body: Vec<AstStmt>) -> AstModule {
    AstModule {
        name: "M".into(),
        imports: vec![],
        source_file: "m.6502".into(),
        decls: vec![AstDecl::Function(AstFunctionDecl {
            name: "main".into(),
            params: vec![],
            return_ty: Type::Void,
            body,
            exported: true,
            location: loc(),
        })],
    }
}

fn int(v: i64) -> AstExpr {
    AstExpr {
        kind: AstExprKind::IntLiteral(v),
        ty: None,
        location: loc(),
    }
}

#[test]
fn s1_minimal_void_main_through_the_compiler_facade() {
    let module = void_main(vec![AstStmt::Return { value: None, location: loc() }]);
    let compiler = Compiler::new(CompilerOptions::default());
    let outcome = compiler.compile(vec![module]).unwrap();

    assert_eq!(outcome.exit_code(), ExitCode::Success);
    assert_eq!(outcome.modules.len(), 1);
    let codegen = &outcome.modules[0].codegen;
    assert!(codegen.assembly.contains("_main:"));
    assert!(codegen.assembly.contains("RTS"));
    assert_eq!(codegen.stats.function_count, 1);
    assert!(codegen.stats.code_size >= 1);
}

#[test]
fn s4_cross_module_lookup_through_the_orchestrator() {
    let b = AstModule {
        name: "B".into(),
        imports: vec![],
        source_file: "b.6502".into(),
        decls: vec![AstDecl::Function(AstFunctionDecl {
            name: "helper".into(),
            params: vec![],
            return_ty: Type::Byte,
            body: vec![AstStmt::Return {
                value: Some(int(42)),
                location: loc(),
            }],
            exported: true,
            location: loc(),
        })],
    };
    let a = AstModule {
        name: "A".into(),
        imports: vec!["B".into()],
        source_file: "a.6502".into(),
        decls: vec![],
    };

    let orch = Orchestrator::new(Architecture::Generic);
    let result = orch.run(vec![a, b]).unwrap();
    assert!(result.success);

    let order: Vec<&str> = result.modules.iter().map(|m| m.name.as_str()).collect();
    let b_pos = order.iter().position(|&n| n == "B").unwrap();
    let a_pos = order.iter().position(|&n| n == "A").unwrap();
    assert!(b_pos < a_pos, "B must be processed before A");

    let helper = result.global_table.lookup("helper", "A").unwrap();
    assert_eq!(helper.module, "B");
}

#[test]
fn s5_circular_import_reports_one_diagnostic_naming_both_modules() {
    let a = AstModule {
        name: "A".into(),
        imports: vec!["B".into()],
        source_file: "a.6502".into(),
        decls: vec![],
    };
    let b = AstModule {
        name: "B".into(),
        imports: vec!["A".into()],
        source_file: "b.6502".into(),
        decls: vec![],
    };

    let orch = Orchestrator::new(Architecture::Generic);
    let err = orch.run(vec![a, b]).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Circular import detected"));

    let a_at = message.find('A').unwrap();
    let b_at = message.find('B').unwrap();
    let a_again = message.rfind('A').unwrap();
    assert!(a_at < b_at && b_at < a_again, "expected the cycle to read roughly A -> B -> A, got: {message}");
}

#[test]
fn s6_badline_warning_then_error_through_the_full_pipeline() {
    // A function whose body lands inside the badline-to-line-budget window
    // on PAL hardware (badline budget 23, line budget 63): each `a + b`
    // statement lowers to two CONSTs (2 cycles each) plus one BINARY (8
    // cycles) = 12 cycles; three of them plus the trailing RETURN_VOID (6
    // cycles) totals 42, comfortably between 23 and 63.
    let mut body = Vec::new();
    for i in 0..3 {
        body.push(AstStmt::ExprStmt(AstExpr {
            kind: AstExprKind::Binary {
                op: BinaryOp::Add,
                lhs: Box::new(int(i)),
                rhs: Box::new(int(i + 1)),
            },
            ty: None,
            location: loc(),
        }));
    }
    body.push(AstStmt::Return { value: None, location: loc() });

    let mut options = CompilerOptions::default();
    options.architecture = Architecture::C64Pal;
    let compiler = Compiler::new(options);
    let outcome = compiler.compile(vec![void_main(body)]).unwrap();

    assert!(outcome.orchestrator.success);
    let warnings = &outcome.orchestrator.modules[0].hardware_warnings;
    assert!(
        warnings.iter().any(|w| w.message.contains("badline")),
        "expected a badline warning, got: {warnings:?}"
    );
}
