// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::{scan::ParserContext, stmt, Parser};
use expect_test::{expect, Expect};
use std::fmt::Display;

pub(crate) fn check<T: Display>(mut parser: impl Parser<T>, input: &str, expect: &Expect) {
    let mut scanner = ParserContext::new(input);
    let result = parser(&mut scanner);
    let errors = scanner.into_errors();
    match result {
        Ok(value) if errors.is_empty() => expect.assert_eq(&value.to_string()),
        Ok(value) => expect.assert_eq(&format!("{value}\n\n{errors:#?}")),
        Err(error) => expect.assert_eq(&format!("Error {error:?}")),
    }
}

fn check_program(input: &str, expect: &Expect) {
    let (program, errors) = crate::parse(input);
    if errors.is_empty() {
        expect.assert_eq(&program.to_string());
    } else {
        expect.assert_eq(&format!("{program}\n\n{errors:#?}"));
    }
}

#[test]
fn gate_call() {
    check(
        stmt::parse,
        "h q;",
        &expect![[r#"
            Stmt [0-4]:
                kind: GateCall:
                    modifiers: <empty>
                    name: Ident [0-1] "h"
                    params: <empty>
                    operands:
                        GateOperand [2-3]:
                            name: Ident [2-3] "q"
                            index: <none>"#]],
    );
}

#[test]
fn gate_call_with_params_and_index() {
    check(
        stmt::parse,
        "rx(0.5) q[0];",
        &expect![[r#"
            Stmt [0-13]:
                kind: GateCall:
                    modifiers: <empty>
                    name: Ident [0-2] "rx"
                    params:
                        Expr [3-6]: Lit: Float(0.5)
                    operands:
                        GateOperand [8-12]:
                            name: Ident [8-9] "q"
                            index: Expr [10-11]: Lit: Int(0)"#]],
    );
}

#[test]
fn gate_call_with_ctrl_modifier() {
    check(
        stmt::parse,
        "ctrl @ x q[0], q[1];",
        &expect![[r#"
            Stmt [0-20]:
                kind: GateCall:
                    modifiers:
                        Ctrl [0-6]
                    name: Ident [7-8] "x"
                    params: <empty>
                    operands:
                        GateOperand [9-13]:
                            name: Ident [9-10] "q"
                            index: Expr [11-12]: Lit: Int(0)
                        GateOperand [15-19]:
                            name: Ident [15-16] "q"
                            index: Expr [17-18]: Lit: Int(1)"#]],
    );
}

#[test]
fn gate_call_with_inv_and_pow_modifiers() {
    check(
        stmt::parse,
        "inv @ pow(2) @ s q;",
        &expect![[r#"
            Stmt [0-19]:
                kind: GateCall:
                    modifiers:
                        Inv [0-5]
                        Pow [6-14]:
                            exponent: Expr [10-11]: Lit: Int(2)
                    name: Ident [15-16] "s"
                    params: <empty>
                    operands:
                        GateOperand [17-18]:
                            name: Ident [17-18] "q"
                            index: <none>"#]],
    );
}

#[test]
fn measure_into_assignment() {
    check(
        stmt::parse,
        "b = measure q;",
        &expect![[r#"
            Stmt [0-14]:
                kind: AssignStmt:
                    lhs: Expr [0-1]: Ident [0-1] "b"
                    rhs: MeasureExpr [4-13]:
                        operand: GateOperand [12-13]:
                            name: Ident [12-13] "q"
                            index: <none>"#]],
    );
}

#[test]
fn measure_arrow_form() {
    check(
        stmt::parse,
        "measure q -> c[0];",
        &expect![[r#"
            Stmt [0-18]:
                kind: MeasureStmt:
                    measurement: MeasureExpr [0-9]:
                        operand: GateOperand [8-9]:
                            name: Ident [8-9] "q"
                            index: <none>
                    target: Expr [13-17]: IndexExpr [13-17]:
                        collection: Expr [13-14]: Ident [13-14] "c"
                        index: Expr [15-16]: Lit: Int(0)"#]],
    );
}

#[test]
fn classical_decl_with_init() {
    check(
        stmt::parse,
        "int[32] x = 5;",
        &expect![[r#"
            Stmt [0-14]:
                kind: ClassicalDeclStmt:
                    type: IntType [0-7]:
                        size: Expr [4-6]: Lit: Int(32)
                    name: Ident [8-9] "x"
                    init: Expr [12-13]: Lit: Int(5)"#]],
    );
}

#[test]
fn bit_decl_with_bitstring_init() {
    check(
        stmt::parse,
        r#"bit[4] c = "0110";"#,
        &expect![[r#"
            Stmt [0-18]:
                kind: ClassicalDeclStmt:
                    type: BitType [0-6]:
                        size: Expr [4-5]: Lit: Int(4)
                    name: Ident [7-8] "c"
                    init: Expr [11-17]: Lit: Bitstring("0110")"#]],
    );
}

#[test]
fn input_decl() {
    check(
        stmt::parse,
        "input float[64] theta;",
        &expect![[r#"
            Stmt [0-22]:
                kind: IODeclStmt:
                    io: input
                    type: FloatType [6-15]:
                        size: Expr [12-14]: Lit: Int(64)
                    name: Ident [16-21] "theta""#]],
    );
}

#[test]
fn if_else_with_single_statement_bodies() {
    check(
        stmt::parse,
        "if (b == 1) x q; else y q;",
        &expect![[r#"
            Stmt [0-26]:
                kind: IfStmt:
                    condition: Expr [4-10]: BinaryOpExpr:
                        op: Eq
                        lhs: Expr [4-5]: Ident [4-5] "b"
                        rhs: Expr [9-10]: Lit: Int(1)
                    if_body: Stmt [12-16]:
                        kind: GateCall:
                            modifiers: <empty>
                            name: Ident [12-13] "x"
                            params: <empty>
                            operands:
                                GateOperand [14-15]:
                                    name: Ident [14-15] "q"
                                    index: <none>
                    else_body: Stmt [22-26]:
                        kind: GateCall:
                            modifiers: <empty>
                            name: Ident [22-23] "y"
                            params: <empty>
                            operands:
                                GateOperand [24-25]:
                                    name: Ident [24-25] "q"
                                    index: <none>"#]],
    );
}

#[test]
fn while_loop() {
    check(
        stmt::parse,
        "while (b == 0) { h q; }",
        &expect![[r#"
            Stmt [0-23]:
                kind: WhileStmt:
                    condition: Expr [7-13]: BinaryOpExpr:
                        op: Eq
                        lhs: Expr [7-8]: Ident [7-8] "b"
                        rhs: Expr [12-13]: Lit: Int(0)
                    body: Stmt [15-23]:
                        kind: Block [15-23]:
                            stmts:
                                Stmt [17-21]:
                                    kind: GateCall:
                                        modifiers: <empty>
                                        name: Ident [17-18] "h"
                                        params: <empty>
                                        operands:
                                            GateOperand [19-20]:
                                                name: Ident [19-20] "q"
                                                index: <none>"#]],
    );
}

#[test]
fn for_loop_over_range() {
    check(
        stmt::parse,
        "for uint i in [0:3] { h q[i]; }",
        &expect![[r#"
            Stmt [0-31]:
                kind: ForStmt:
                    variable_type: UIntType [4-8]:
                        size: <none>
                    variable_name: Ident [9-10] "i"
                    iterable: Range [15-18]:
                        start: Expr [15-16]: Lit: Int(0)
                        step: <none>
                        end: Expr [17-18]: Lit: Int(3)
                    body: Stmt [20-31]:
                        kind: Block [20-31]:
                            stmts:
                                Stmt [22-29]:
                                    kind: GateCall:
                                        modifiers: <empty>
                                        name: Ident [22-23] "h"
                                        params: <empty>
                                        operands:
                                            GateOperand [24-28]:
                                                name: Ident [24-25] "q"
                                                index: Expr [26-27]: Ident [26-27] "i""#]],
    );
}

#[test]
fn switch_with_cases_and_default() {
    check(
        stmt::parse,
        "switch (x) { case 1, 2 { y q; } default { z q; } }",
        &expect![[r#"
            Stmt [0-50]:
                kind: SwitchStmt:
                    selector: Expr [8-9]: Ident [8-9] "x"
                    cases:
                        SwitchCase [13-31]:
                            labels:
                                Expr [18-19]: Lit: Int(1)
                                Expr [21-22]: Lit: Int(2)
                            body: Block [23-31]:
                                stmts:
                                    Stmt [25-29]:
                                        kind: GateCall:
                                            modifiers: <empty>
                                            name: Ident [25-26] "y"
                                            params: <empty>
                                            operands:
                                                GateOperand [27-28]:
                                                    name: Ident [27-28] "q"
                                                    index: <none>
                    default: Block [40-48]:
                        stmts:
                            Stmt [42-46]:
                                kind: GateCall:
                                    modifiers: <empty>
                                    name: Ident [42-43] "z"
                                    params: <empty>
                                    operands:
                                        GateOperand [44-45]:
                                            name: Ident [44-45] "q"
                                            index: <none>"#]],
    );
}

#[test]
fn alias_of_register_slice() {
    check(
        stmt::parse,
        "let a = q[0:1];",
        &expect![[r#"
            Stmt [0-15]:
                kind: AliasDeclStmt:
                    name: Ident [4-5] "a"
                    target: Expr [8-14]: IndexExpr [8-14]:
                        collection: Expr [8-9]: Ident [8-9] "q"
                        index: Range [10-13]:
                            start: Expr [10-11]: Lit: Int(0)
                            step: <none>
                            end: Expr [12-13]: Lit: Int(1)"#]],
    );
}

#[test]
fn gate_def() {
    check(
        stmt::parse,
        "gate flip q { x q; }",
        &expect![[r#"
            Stmt [0-20]:
                kind: GateDef:
                    name: Ident [5-9] "flip"
                    params: <empty>
                    qubits:
                        Ident [10-11] "q"
                    body: Block [12-20]:
                        stmts:
                            Stmt [14-18]:
                                kind: GateCall:
                                    modifiers: <empty>
                                    name: Ident [14-15] "x"
                                    params: <empty>
                                    operands:
                                        GateOperand [16-17]:
                                            name: Ident [16-17] "q"
                                            index: <none>"#]],
    );
}

#[test]
fn def_with_return_type() {
    check(
        stmt::parse,
        "def f(int n) -> int { return n; }",
        &expect![[r#"
            Stmt [0-33]:
                kind: DefStmt:
                    name: Ident [4-5] "f"
                    params:
                        TypedParameter [6-11]:
                            type: IntType [6-9]:
                                size: <none>
                            name: Ident [10-11] "n"
                    return_type: IntType [16-19]:
                        size: <none>
                    body: Block [20-33]:
                        stmts:
                            Stmt [22-31]:
                                kind: ReturnStmt:
                                    value: Expr [29-30]: Ident [29-30] "n""#]],
    );
}

#[test]
fn binary_op_precedence() {
    check(
        stmt::parse,
        "y = a + b * c;",
        &expect![[r#"
            Stmt [0-14]:
                kind: AssignStmt:
                    lhs: Expr [0-1]: Ident [0-1] "y"
                    rhs: Expr [4-13]: BinaryOpExpr:
                        op: Add
                        lhs: Expr [4-5]: Ident [4-5] "a"
                        rhs: Expr [8-13]: BinaryOpExpr:
                            op: Mul
                            lhs: Expr [8-9]: Ident [8-9] "b"
                            rhs: Expr [12-13]: Ident [12-13] "c""#]],
    );
}

#[test]
fn ternary_expr() {
    check(
        stmt::parse,
        "y = b == 1 ? 2 : 3;",
        &expect![[r#"
            Stmt [0-19]:
                kind: AssignStmt:
                    lhs: Expr [0-1]: Ident [0-1] "y"
                    rhs: Expr [4-18]: TernaryExpr:
                        cond: Expr [4-10]: BinaryOpExpr:
                            op: Eq
                            lhs: Expr [4-5]: Ident [4-5] "b"
                            rhs: Expr [9-10]: Lit: Int(1)
                        if_true: Expr [13-14]: Lit: Int(2)
                        if_false: Expr [17-18]: Lit: Int(3)"#]],
    );
}

#[test]
fn cast_expr() {
    check(
        stmt::parse,
        "x = int(y);",
        &expect![[r#"
            Stmt [0-11]:
                kind: AssignStmt:
                    lhs: Expr [0-1]: Ident [0-1] "x"
                    rhs: Expr [4-10]: Cast [4-10]:
                        type: IntType [4-7]:
                            size: <none>
                        arg: Expr [8-9]: Ident [8-9] "y""#]],
    );
}

#[test]
fn compound_assignment() {
    check(
        stmt::parse,
        "count += 1;",
        &expect![[r#"
            Stmt [0-11]:
                kind: AssignOpStmt:
                    op: Add
                    lhs: Expr [0-5]: Ident [0-5] "count"
                    rhs: Expr [9-10]: Lit: Int(1)"#]],
    );
}

#[test]
fn reset_stmt() {
    check(
        stmt::parse,
        "reset q;",
        &expect![[r#"
            Stmt [0-8]:
                kind: ResetStmt:
                    operand: GateOperand [6-7]:
                        name: Ident [6-7] "q"
                        index: <none>"#]],
    );
}

#[test]
fn missing_semi_is_recovered() {
    check(
        stmt::parse,
        "x q",
        &expect![[r#"
            Stmt [0-3]:
                kind: GateCall:
                    modifiers: <empty>
                    name: Ident [0-1] "x"
                    params: <empty>
                    operands:
                        GateOperand [2-3]:
                            name: Ident [2-3] "q"
                            index: <none>

            [
                Error(
                    Token(
                        Semi,
                        Eof,
                        Span {
                            lo: 3,
                            hi: 3,
                        },
                    ),
                ),
            ]"#]],
    );
}

#[test]
fn program_with_version_header() {
    check_program(
        "OPENQASM 3.0;\nqubit[2] q;",
        &expect![[r#"
            Program [0-25]:
                version: 3.0
                statements:
                    Stmt [14-25]:
                        kind: QubitDeclStmt:
                            name: Ident [23-24] "q"
                            size: Expr [20-21]: Lit: Int(2)"#]],
    );
}

#[test]
fn bad_statement_recovers_at_semi() {
    let (program, errors) = crate::parse("qubit q; 2 + ; h q;");
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert_eq!(program.statements.len(), 2);
}
