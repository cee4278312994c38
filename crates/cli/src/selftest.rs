//! Bundled self-test pool and the functions YAML specs may name

use smoke_core::{assert, CallContext, Func, FunctionRegistry, TestEntry, TestNode, TestResult, TestType};
use std::time::Duration;

const TRACE: &str = "trace";

const CANONICAL: &[&str] = &[
    "root-before",
    "root-beforeEach",
    "test1",
    "root-afterEach",
    "group-before",
    "root-beforeEach",
    "group-beforeEach",
    "testA",
    "group-afterEach",
    "group-beforeEach",
    "testB",
    "group-afterEach",
    "group-after",
    "root-afterEach",
    "root-beforeEach",
    "test2",
    "root-afterEach",
];

/// Trees compiled into the binary
pub fn pool() -> Vec<TestNode> {
    vec![traverse(), minimal(), browser_reference()]
}

/// Functions a YAML spec can refer to by name
pub fn functions() -> FunctionRegistry {
    let mut functions = FunctionRegistry::new();
    functions
        .register("pass", Func::sync(pass))
        .register("fail", Func::sync(fail))
        .register("note", Func::sync(note))
        .register("pause", Func::future(pause));
    functions
}

fn pass(_cx: CallContext) -> TestResult {
    Ok(())
}

fn fail(cx: CallContext) -> TestResult {
    anyhow::bail!("{} failed on purpose", cx.test_name())
}

fn note(cx: CallContext) -> TestResult {
    cx.reporter().log_note(&format!("visited {}", cx.test_name()), false);
    Ok(())
}

async fn pause(_cx: CallContext) -> TestResult {
    tokio::time::sleep(Duration::from_millis(10)).await;
    Ok(())
}

fn step(label: &'static str) -> Func {
    Func::sync(move |cx| {
        let pushed = cx.scratch().with(TRACE, |trace: &mut Vec<String>| trace.push(label.to_string()));
        assert(pushed.is_some(), "trace missing from scratch")
    })
    .named(label)
}

/// Records every scheduled call and checks the order at the end.
fn traverse() -> TestNode {
    let group = TestNode::new("group")
        .before(step("group-before"))
        .before_each(step("group-beforeEach"))
        .after_each(step("group-afterEach"))
        .after(step("group-after"))
        .tests(vec![TestEntry::pair("testA", step("testA")), TestEntry::pair("testB", step("testB"))]);

    TestNode::new("traverse")
        .before(Func::sync(|cx| {
            cx.scratch().insert(TRACE, vec!["root-before".to_string()]);
            Ok(())
        }))
        .before_each(step("root-beforeEach"))
        .after_each(step("root-afterEach"))
        .after(Func::sync(|cx| {
            let trace: Vec<String> = cx.scratch().get(TRACE).unwrap_or_default();
            assert(trace == CANONICAL, &format!("unexpected order {:?}", trace))
        }))
        .tests(vec![
            TestEntry::pair("test1", step("test1")),
            group.into(),
            TestEntry::pair("test2", step("test2")),
        ])
}

fn minimal() -> TestNode {
    TestNode::new("minimal").order(1.0).tests(vec![
        TestEntry::from(Func::sync(pass)),
        TestEntry::pair("arithmetic", Func::sync(|_| assert(2 + 2 == 4, "2 + 2 == 4"))),
        TestEntry::pair("awaited", Func::future(pause)),
    ])
}

/// Only ever dispatched to a browser session
fn browser_reference() -> TestNode {
    TestNode::new("browser")
        .kind(TestType::BrowserOnly)
        .test(Func::sync(|cx| assert(cx.driver().is_none(), "browser tests drive nothing")))
}
