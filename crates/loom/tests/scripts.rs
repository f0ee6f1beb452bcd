//! Golden-file script runner (§10 "Test tooling").
//!
//! Every `tests/scripts/*.loom` fixture is a small program ending in a
//! trailing `// => expected` comment. The fixture is parsed and evaluated
//! against a fresh `Vm`'s `Lobby`, same as the CLI's `doFile` path, and the
//! final result is rendered and compared against `expected`.

use std::path::Path;

use loom::{Stop, Tag, Vm};

fn render(tag: &Tag) -> String {
    match tag {
        Tag::None => "nil".to_owned(),
        Tag::Number(n) => {
            if n.fract() == 0.0 && n.is_finite() {
                format!("{n:.0}")
            } else {
                n.to_string()
            }
        }
        Tag::Sequence(s) => s.clone(),
        Tag::List(items) => {
            let rendered: Vec<String> = items.iter().map(|item| item.with_tag(render)).collect();
            format!("list({})", rendered.join(", "))
        }
        other => other.name().to_owned(),
    }
}

fn expected_result(source: &str) -> String {
    let marker = "// => ";
    let line = source.lines().rev().find(|line| line.contains(marker)).unwrap_or_else(|| panic!("fixture has no `{marker}` trailer"));
    let pos = line.find(marker).unwrap();
    line[pos + marker.len()..].trim().to_owned()
}

fn run_fixture(path: &Path) -> datatest_stable::Result<()> {
    let source = std::fs::read_to_string(path)?;
    let expected = expected_result(&source);
    let label = path.file_stem().and_then(|s| s.to_str()).unwrap_or("fixture").to_owned();
    let vm = Vm::new().leak();
    let outcome = loom::repl::run_source(vm, &source, &label)?;
    vm.scheduler.wait_for_quiescence();
    let actual = match outcome {
        (result, Stop::None) => result.with_tag(render),
        (_, Stop::Exit(payload)) => payload.with_tag(render),
        (_, other) => panic!("{label}: unexpected top-level stop {}", other.tag_name()),
    };
    assert_eq!(actual, expected, "{label}: source produced {actual:?}, fixture expects {expected:?}");
    Ok(())
}

datatest_stable::harness!(run_fixture, "tests/scripts", r"^.*\.loom$");
