//! Parser and printer integration tests
//!
//! Covers the literal debugging form of parsed ASTs, source-info
//! contents (positions, macro calls, extensions), and diagnostic
//! rendering for parse failures.

use cel_core::ast::navigation::NavigableAst;
use cel_core::ast::printer::print_expr;
use cel_core::ast::ExprVariant;
use cel_core::parser::parse;

#[test]
fn test_print_addition_snapshot() {
    let ast = parse("1 + 2").unwrap();
    insta::assert_snapshot!(print_expr(ast.root()), @r###"
    CALL [3] {
      function: _+_
      args: { CONSTANT [1] { value: 1 } CONSTANT [2] { value: 2 } }
    }
    "###);
}

#[test]
fn test_print_literals_snapshot() {
    let ast = parse(r#"[1, 2u, 1.5, "a", b"b", null, true]"#).unwrap();
    insta::assert_snapshot!(print_expr(ast.root()), @r###"
    LIST [8] {
      elements: {
        CONSTANT [1] { value: 1 }
        CONSTANT [2] { value: 2u }
        CONSTANT [3] { value: 1.5 }
        CONSTANT [4] { value: "a" }
        CONSTANT [5] { value: b"b" }
        CONSTANT [6] { value: null }
        CONSTANT [7] { value: true }
      }
    }
    "###);
}

#[test]
fn test_comprehension_printed_form() {
    let ast = parse("[false].exists(i, i)").unwrap();
    let printed = print_expr(ast.root());
    // The expansion renders as a comprehension with the declared
    // iteration variable and the internal accumulator.
    assert!(printed.starts_with("COMPREHENSION ["), "got:\n{}", printed);
    assert!(printed.contains("iter_var: i"), "got:\n{}", printed);
    assert!(printed.contains("accu_var: @result"), "got:\n{}", printed);
    assert!(
        printed.contains("LIST [2] { elements: { CONSTANT [1] { value: false } } }"),
        "got:\n{}",
        printed
    );
    assert!(printed.contains("loop_condition:"), "got:\n{}", printed);
    assert!(printed.contains("loop_step:"), "got:\n{}", printed);
    assert!(printed.contains("result:"), "got:\n{}", printed);
}

#[test]
fn test_positions_point_at_expression_starts() {
    let text = "foo.bar + [1, 2]";
    let ast = parse(text).unwrap();
    let info = ast.source_info();
    let root = ast.root();
    // The addition starts where its left operand starts.
    assert_eq!(info.position_of(root.id), Some(0));
    let children = root.children();
    assert_eq!(info.position_of(children[0].id), Some(0));
    assert_eq!(info.position_of(children[1].id), Some(10));
    let location = info.location_of(children[1].id).unwrap();
    assert_eq!((location.line, location.column), (1, 11));
}

#[test]
fn test_macro_call_map_invariants() {
    let ast = parse("[1].map(x, x + 1) == [2] && has(a.b)").unwrap();
    let info = ast.source_info();
    assert_eq!(info.macro_calls().len(), 2);

    // Every macro-call key is the id of a node in the main tree, and
    // every placeholder reference resolves into the main tree.
    for (&key, call) in info.macro_calls() {
        assert!(ast.find_expr(key).is_some(), "dangling key {}", key);
        call.walk(&mut |node| {
            if node.variant() == ExprVariant::NotSet {
                assert!(
                    ast.find_expr(node.id).is_some(),
                    "dangling reference {}",
                    node.id
                );
            } else {
                // Interior macro nodes are outside the id space.
                assert_eq!(node.id, 0, "interior node with id {}", node.id);
            }
        });
    }
}

#[test]
fn test_navigable_view_over_parsed_ast() {
    let ast = parse("a.b + f(1, 2)").unwrap();
    let view = NavigableAst::new(&ast);

    let root = view.root();
    assert_eq!(root.variant(), ExprVariant::Call);
    assert_eq!(root.depth(), 0);

    let constants = view.nodes_of_variant(ExprVariant::Constant);
    assert_eq!(constants.len(), 2);
    assert!(constants.iter().all(|n| n.depth() == 2));
    assert_eq!(
        constants[0].parent().unwrap().variant(),
        ExprVariant::Call
    );

    // Pre-order visits a parent before its subtree; descendants come
    // children-first and exclude the node itself.
    let pre_order: Vec<_> = view.all_nodes().iter().map(|n| n.id()).collect();
    assert_eq!(pre_order[0], root.id());
    let descendants: Vec<_> = root.descendants().iter().map(|n| n.id()).collect();
    assert_eq!(descendants.len(), pre_order.len() - 1);
    let children = root.children();
    assert_eq!(
        descendants.last().copied(),
        children.last().map(|c| c.id())
    );
    // The first descendant is the deepest leftmost leaf.
    assert_eq!(descendants.first().copied(), Some(pre_order[2]));
}

#[test]
fn test_parse_error_rendering_snapshot() {
    let errors = parse("a + + b").unwrap_err();
    insta::assert_snapshot!(errors.to_string(), @r###"
    ERROR: <input>:1:5: unexpected '+'
     | a + + b
     | ....^
    "###);
}

#[test]
fn test_multiple_errors_in_report_order() {
    let errors = parse("= =").unwrap_err();
    assert!(errors.len() >= 2);
    let offsets: Vec<_> = errors.errors().iter().map(|e| e.offset).collect();
    let mut sorted = offsets.clone();
    sorted.sort_unstable();
    assert_eq!(offsets, sorted, "errors must keep report order");
}

#[test]
fn test_supplementary_plane_source_positions() {
    // The emoji is one code point; the list starts at offset 2.
    let ast = parse("\u{1F600} [1]").unwrap_err();
    // An emoji is not a valid expression; the error is at offset 0.
    assert_eq!(ast.errors()[0].offset, 0);

    let ast = parse("['\u{1F600}', x]").unwrap();
    let info = ast.source_info();
    let list = ast.root();
    let children = list.children();
    // 'x' sits at code-point offset 6: the emoji counts as one code
    // point even though it needs four UTF-8 bytes.
    assert_eq!(info.position_of(children[1].id), Some(6));
}
