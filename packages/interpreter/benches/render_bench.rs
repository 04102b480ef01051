use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nhaml_common::MockFileSystem;
use nhaml_compiler::{compile_view, CompileOptions, RenderContext};
use nhaml_interpreter::Interpreter;
use nhaml_parser::parse;
use serde_json::json;
use std::sync::Arc;

const TEMPLATE: &str = r#"
%html
  %body
    %h1.title= model.title
    %ul
      - if (len(model.items) > 0)
        %li= join(model.items, ", ")
      - else
        %li.empty none
    %p Signed in as #{upper(model.user.name)}
"#;

fn context() -> RenderContext {
    RenderContext::from_documents(
        None,
        parse(TEMPLATE).unwrap(),
        "views",
        Arc::new(MockFileSystem::new()),
        "haml",
    )
}

fn compile_template(c: &mut Criterion) {
    let context = context();
    let options = CompileOptions::default();

    c.bench_function("compile_view", |b| {
        b.iter(|| compile_view(black_box(&context), &Interpreter::new(), &options, "Page"))
    });
}

fn render_compiled(c: &mut Criterion) {
    let renderer =
        compile_view(&context(), &Interpreter::new(), &CompileOptions::default(), "Page").unwrap();
    let model = json!({
        "title": "Benchmark",
        "items": ["a", "b", "c", "d"],
        "user": {"name": "ann"}
    });

    c.bench_function("render_compiled_view", |b| {
        b.iter(|| {
            let mut out = String::with_capacity(256);
            renderer.render(&mut out, black_box(&model)).unwrap();
            out
        })
    });
}

criterion_group!(benches, compile_template, render_compiled);
criterion_main!(benches);
