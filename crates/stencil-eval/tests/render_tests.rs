//! Evaluation semantics, exercised through `Handler::render_string`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use stencil_eval::{Bindings, Handler, HandlerConfig, RenderError, TemplateObject, Value};
use stencil_types::ErrorCode;

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn bindings<const N: usize>(pairs: [(&str, Value); N]) -> Bindings {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

fn render_with(handler: &mut Handler, source: &str, vars: &Bindings) -> String {
    match handler.render_string(source, vars) {
        Ok(out) => out,
        Err(e) => panic!("render of {source:?} failed: {e}"),
    }
}

fn render(source: &str, vars: &Bindings) -> String {
    render_with(&mut Handler::new(HandlerConfig::default()), source, vars)
}

fn render_plain(source: &str) -> String {
    render(source, &Bindings::new())
}

/// A host object that counts every method invocation.
#[derive(Debug, Default)]
struct Recorder {
    calls: Arc<AtomicUsize>,
}

impl TemplateObject for Recorder {
    fn call_method(&self, method: &str, args: &[Value]) -> Result<Value, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match method {
            "greet" => {
                let name = args.first().map(Value::display).unwrap_or_default();
                Ok(Value::from(format!("Hello {name}")))
            }
            "isAdmin" => Ok(Value::Bool(true)),
            "delete" => Ok(Value::from("deleted")),
            other => Err(format!("no method {other}")),
        }
    }

    fn display(&self) -> String {
        String::from("[recorder]")
    }
}

fn recorder() -> (Value, Arc<AtomicUsize>) {
    let rec = Recorder::default();
    let calls = Arc::clone(&rec.calls);
    (Value::object(rec), calls)
}

// ══════════════════════════════════════════════════════════════════════════════
// Literal text & output
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn text_without_tags_round_trips() {
    let source = "<style>\n  body { color: red; }\n  p{color:blue;}\n</style>\n\
                  <script>if (a) { b(); } else {}</script>\n";
    assert_eq!(render_plain(source), source);
}

#[test]
fn comment_text_is_dropped() {
    assert_eq!(render_plain("a{* never {shown} *}b"), "ab");
}

#[test]
fn comments_do_not_mask_directives() {
    assert_eq!(render_plain("{* {SET x = 1} *}[{x}]"), "[1]");
    let vars = bindings([("on", Value::Bool(false))]);
    assert_eq!(render("a{* {IF on} *}hidden{ENDIF}b", &vars), "ab");
}

#[test]
fn unbound_variables_render_empty() {
    assert_eq!(render_plain("a{missing}b{missing:x:y}c"), "abc");
}

#[test]
fn scalars_display() {
    let vars = bindings([
        ("n", Value::from(2.0)),
        ("f", Value::from(2.5)),
        ("t", Value::Bool(true)),
        ("s", Value::from("x")),
        ("list", Value::list(vec![1])),
    ]);
    assert_eq!(render("{n}|{f}|{t}|{s}|{list}", &vars), "2|2.5|true|x|Array");
}

#[test]
fn array_keys() {
    let rows = Value::list(vec![
        Value::map([("title", "first")]),
        Value::map([("title", "second")]),
    ]);
    let vars = bindings([
        ("rows", rows),
        ("cfg", Value::map([("key", "literal"), ("other", "no")])),
    ]);
    assert_eq!(render("{rows:1:title} {cfg:key}", &vars), "second literal");
}

#[test]
fn arithmetic() {
    let vars = bindings([("price", Value::from("4.5")), ("qty", Value::from(3))]);
    assert_eq!(
        render("{price * 2} {qty - 1} {7 / 2} {7 % 3} {-7 % 3} {qty + -1}", &vars),
        "9 2 3.5 1 -1 2"
    );
}

#[test]
fn modulo_truncates_operands() {
    assert_eq!(render_plain("{7.9 % 3.2}"), "1");
}

#[test]
fn division_by_zero_is_fatal() {
    let mut handler = Handler::new(HandlerConfig::default());
    for source in ["{1 / 0}", "{5 % 0.5}"] {
        let err = handler.render_string(source, &Bindings::new()).unwrap_err();
        assert!(
            matches!(err, RenderError::DivisionByZero { ref template } if template == "<string>"),
            "unexpected {err:?}"
        );
    }
}

#[test]
fn concatenation() {
    let vars = bindings([("first", Value::from("Ada")), ("n", Value::from(3))]);
    assert_eq!(render("{first ~ ' x' ~ n ~ \"!\"}", &vars), "Ada x3!");
}

// ══════════════════════════════════════════════════════════════════════════════
// Conditions
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn unbound_variable_never_satisfies_a_comparison() {
    for source in [
        "{IF missing == ''}yes{ELSE}no{ENDIF}",
        "{IF missing != 'x'}yes{ELSE}no{ENDIF}",
        "{IF '' == missing}yes{ELSE}no{ENDIF}",
        "{IF missing:k === missing:k}yes{ELSE}no{ENDIF}",
        "{IF missing.length == missing.length}yes{ELSE}no{ENDIF}",
    ] {
        assert_eq!(render_plain(source), "no", "source {source:?}");
    }
}

#[test]
fn null_binding_counts_as_unbound() {
    let vars = bindings([("v", Value::Null)]);
    assert_eq!(render("{IF v == ''}yes{ELSE}no{ENDIF}", &vars), "no");
}

#[test]
fn arithmetic_operands_are_not_guarded() {
    assert_eq!(render_plain("{IF missing + 1 == 1}yes{ELSE}no{ENDIF}"), "yes");
}

#[test]
fn loose_and_strict_equality() {
    let vars = bindings([("n", Value::from(5)), ("s", Value::from("5.0"))]);
    assert_eq!(render("{IF n == '5'}a{ENDIF}", &vars), "a");
    assert_eq!(render("{IF n === '5'}a{ELSE}b{ENDIF}", &vars), "b");
    assert_eq!(render("{IF n !== '5'}a{ENDIF}", &vars), "a");
    assert_eq!(render("{IF s == 5}a{ELSE}b{ENDIF}", &vars), "b");
}

#[test]
fn ordering() {
    let vars = bindings([("a", Value::from("10")), ("w", Value::from("apple"))]);
    assert_eq!(render("{IF a > 9}gt{ENDIF}", &vars), "gt");
    assert_eq!(render("{IF a >= '10'}ge{ENDIF}", &vars), "ge");
    assert_eq!(render("{IF w < 'banana'}lt{ENDIF}", &vars), "lt");
    assert_eq!(render("{IF w <= 'apple'}le{ENDIF}", &vars), "le");
}

#[test]
fn boolean_combinations() {
    let vars = bindings([
        ("name", Value::from("Bob")),
        ("age", Value::from(16)),
        ("admin", Value::Bool(true)),
    ]);
    assert_eq!(
        render("{IF name == 'Bob' && (age >= 18 || admin)}ok{ELSE}no{ENDIF}", &vars),
        "ok"
    );
    assert_eq!(
        render("{IF name == 'Al' || age > 15 && admin}ok{ELSE}no{ENDIF}", &vars),
        "ok"
    );
    assert_eq!(
        render("{IF (name == 'Bob' || admin) && missing}ok{ELSE}no{ENDIF}", &vars),
        "no"
    );
}

#[test]
fn truthiness_without_operator() {
    let vars = bindings([
        ("zero", Value::from("0")),
        ("list", Value::list(vec![1])),
        ("empty", Value::list(Vec::<i32>::new())),
    ]);
    assert_eq!(
        render("{IF zero}a{ENDIF}{IF list}b{ENDIF}{IF empty}c{ENDIF}", &vars),
        "b"
    );
}

// ══════════════════════════════════════════════════════════════════════════════
// Loops
// ══════════════════════════════════════════════════════════════════════════════

fn five_items() -> Bindings {
    bindings([("items", Value::list(vec!["a", "b", "c", "d", "e"]))])
}

#[test]
fn pseudo_properties() {
    let vars = five_items();
    assert_eq!(render("{items.length}", &vars), "5");
    assert_eq!(render("{items.last}", &vars), "4");
    assert_eq!(
        render("{LOOP items as v}{items.current}{ENDLOOP}", &vars),
        "01234"
    );
}

#[test]
fn current_outside_loop_is_empty() {
    assert_eq!(render("[{items.current}]", &five_items()), "[]");
}

#[test]
fn backward_loop() {
    let vars = bindings([("items", Value::list(vec!["a", "b", "c"]))]);
    assert_eq!(
        render("{LOOPBW items as v}{v}{items.current}{ENDLOOP}", &vars),
        "c2b1a0"
    );
}

#[test]
fn loop_with_keys_keeps_insertion_order() {
    let users = Value::map([
        ("z", Value::map([("name", "Zoe")])),
        ("a", Value::map([("name", "Ann")])),
    ]);
    let vars = bindings([("users", users)]);
    assert_eq!(
        render("{LOOP users as id => u}{id}={u:name};{ENDLOOP}", &vars),
        "z=Zoe;a=Ann;"
    );
}

#[test]
fn json_objects_loop_in_document_order() {
    let json = serde_json::json!({"zeta": 1, "alpha": 2, "mid": {"y": 1, "x": 2}});
    let vars = bindings([("m", Value::from(json))]);
    assert_eq!(render("{LOOP m as k => v}{k},{ENDLOOP}", &vars), "zeta,alpha,mid,");
    assert_eq!(render("{LOOPBW m:mid as k => v}{k}{ENDLOOP}", &vars), "xy");
}

#[test]
fn loop_variables_are_scoped_to_the_body() {
    let vars = bindings([("items", Value::list(vec![1, 2])), ("v", Value::from("outer"))]);
    assert_eq!(render("{LOOP items as v}{v}{ENDLOOP}{v}", &vars), "12outer");
}

#[test]
fn nested_loops_and_counters() {
    let grid = Value::list(vec![Value::list(vec!["a", "b"]), Value::list(vec!["c"])]);
    let vars = bindings([("grid", grid)]);
    assert_eq!(
        render(
            "{LOOP grid as row}{LOOP row as cell}{grid.current}{row.current}{cell} {ENDLOOP}{ENDLOOP}",
            &vars
        ),
        "00a 01b 10c "
    );
}

#[test]
fn loop_over_non_array_renders_nothing() {
    let vars = bindings([("s", Value::from("text"))]);
    assert_eq!(render("[{LOOP s as v}{v}{ENDLOOP}{LOOP nope as v}x{ENDLOOP}]", &vars), "[]");
}

#[test]
fn ranges() {
    assert_eq!(render_plain("{LOOP i in 1..3}{i} {ENDLOOP}"), "1 2 3 ");
    assert_eq!(render_plain("{LOOP i in 3..1}{i} {ENDLOOP}"), "3 2 1 ");
    assert_eq!(render_plain("{LOOP i in -1..1}{i},{ENDLOOP}"), "-1,0,1,");
    assert_eq!(render_plain("{LOOP i in 2..2}{i}{ENDLOOP}"), "2");
}

#[test]
fn range_bounds_from_variables() {
    let vars = bindings([("n", Value::from("3.9")), ("items", Value::list(vec![1, 2]))]);
    assert_eq!(render("{LOOP i in 1..n}{i}{ENDLOOP}", &vars), "123");
    assert_eq!(render("{LOOP i in 0..items.last}{i}{ENDLOOP}", &vars), "01");
}

// ══════════════════════════════════════════════════════════════════════════════
// SET
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn set_then_output() {
    assert_eq!(render_plain("{SET x = 'a' ~ 1}{x}"), "a1");
}

#[test]
fn set_accumulates_across_loop_iterations() {
    let vars = bindings([("items", Value::list(vec![1, 2, 3]))]);
    assert_eq!(
        render("{SET total = 0}{LOOP items as v}{SET total = total + v}{ENDLOOP}{total}", &vars),
        "6"
    );
}

#[test]
fn set_does_not_leak_into_caller_bindings() {
    let vars = bindings([("x", Value::from("before"))]);
    let mut handler = Handler::new(HandlerConfig::default());
    assert_eq!(render_with(&mut handler, "{SET x = 'after'}{x}", &vars), "after");
    assert_eq!(vars["x"], Value::from("before"));
}

// ══════════════════════════════════════════════════════════════════════════════
// Method calls
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn allowed_method_is_called() {
    let (user, calls) = recorder();
    let mut handler = Handler::new(HandlerConfig::default());
    handler.allow_method("user", "greet");
    let vars = bindings([("user", user), ("name", Value::from("Ann"))]);
    assert_eq!(render_with(&mut handler, "{user.greet(name ~ '!')}", &vars), "Hello Ann!");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn disallowed_method_never_runs() {
    let (user, calls) = recorder();
    let mut handler = Handler::new(HandlerConfig::default());
    handler.allow_method("user", "greet");
    let vars = bindings([("user", user)]);

    let err = handler
        .render_string("before {user.delete()} after", &vars)
        .unwrap_err();
    match err {
        RenderError::MethodNotAllowed {
            object,
            method,
            template,
        } => {
            assert_eq!((object.as_str(), method.as_str()), ("user", "delete"));
            assert_eq!(template, "<string>");
        }
        other => panic!("expected MethodNotAllowed, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn disallowed_method_in_untaken_branch_is_fine() {
    let (user, calls) = recorder();
    let mut handler = Handler::new(HandlerConfig::default());
    let vars = bindings([("user", user)]);
    let out = render_with(&mut handler, "{IF 0}{user.delete()}{ENDIF}ok", &vars);
    assert_eq!(out, "ok");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn wildcard_and_unlimited_calls() {
    let (user, _) = recorder();
    let vars = bindings([("user", user)]);

    let mut handler = Handler::new(HandlerConfig::default());
    handler.allow_method("user", "*");
    assert_eq!(render_with(&mut handler, "{user.delete()}", &vars), "deleted");

    let mut open = Handler::new(HandlerConfig::default().with_limit_method_calls(false));
    assert!(open.is_method_allowed("user", "anything"));
    assert_eq!(render_with(&mut open, "{IF user.isAdmin()}admin{ENDIF}", &vars), "admin");
}

#[test]
fn method_on_non_object_yields_empty() {
    let mut handler = Handler::new(HandlerConfig::default());
    handler.allow_method("user", "greet");
    let vars = bindings([("user", Value::from("plain"))]);
    assert_eq!(render_with(&mut handler, "[{user.greet()}]", &vars), "[]");
}

#[test]
fn method_failure_is_reported() {
    let (user, _) = recorder();
    let mut handler = Handler::new(HandlerConfig::default());
    handler.allow_method("user", "explode");
    let err = handler
        .render_string("{user.explode()}", &bindings([("user", user)]))
        .unwrap_err();
    assert!(matches!(
        err,
        RenderError::MethodFailed { ref message, .. } if message == "no method explode"
    ));
}

#[test]
fn object_display() {
    let (user, _) = recorder();
    assert_eq!(render("{user}", &bindings([("user", user)])), "[recorder]");
}

// ══════════════════════════════════════════════════════════════════════════════
// Globals & compile errors
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn globals_are_visible_and_shadowed_by_frame() {
    let mut handler = Handler::new(HandlerConfig::default());
    handler.bind_global("site", "Example");
    handler.bind_global("title", "Global");
    let vars = bindings([("title", Value::from("Local"))]);
    assert_eq!(render_with(&mut handler, "{site}: {title}", &vars), "Example: Local");
}

#[test]
fn compile_error_names_fragment() {
    let mut handler = Handler::new(HandlerConfig::default());
    let err = handler
        .render_string("ok\n{IF a ==}x{ENDIF}", &Bindings::new())
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("<string>"), "{message}");
    assert!(message.contains("{IF a ==}"), "{message}");
}

fn first_error_code(source: &str) -> Option<ErrorCode> {
    match Handler::new(HandlerConfig::default()).render_string(source, &Bindings::new()) {
        Err(RenderError::Compile { errors, .. }) => errors.first().map(|e| e.code),
        other => panic!("expected compile error, got {other:?}"),
    }
}

#[test]
fn deeply_nested_blocks_are_rejected() {
    let depth = 20_000;
    let source = format!("{}x{}", "{IF a}".repeat(depth), "{ENDIF}".repeat(depth));
    assert_eq!(first_error_code(&source), Some(ErrorCode::STRUCTURAL_LIMIT_EXCEEDED));
}

#[test]
fn deeply_nested_parentheses_are_rejected() {
    let depth = 200_000;
    let source = format!("{{IF {}a{}}}x{{ENDIF}}", "(".repeat(depth), ")".repeat(depth));
    assert_eq!(first_error_code(&source), Some(ErrorCode::STRUCTURAL_LIMIT_EXCEEDED));
}

#[test]
fn string_templates_cannot_include() {
    let mut handler = Handler::new(HandlerConfig::default());
    let err = handler
        .render_string("{include 'a.htm'}", &Bindings::new())
        .unwrap_err();
    match err {
        RenderError::Compile { errors, .. } => {
            assert_eq!(errors.first().map(|e| e.code), Some(ErrorCode::INCLUDE_NOT_ALLOWED));
        }
        other => panic!("expected compile error, got {other:?}"),
    }
}
