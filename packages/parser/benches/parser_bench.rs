use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nhaml_parser::parse;

fn parse_simple_template(c: &mut Criterion) {
    let source = r#"
%p.greeting Hello #{model.name}
"#;

    c.bench_function("parse_simple_template", |b| {
        b.iter(|| parse(black_box(source)))
    });
}

fn parse_layout_template(c: &mut Criterion) {
    let source = r#"
!!!
%html
  %head
    %title= model.title
  %body
    .container#content{ :class => model.theme }
      - if (model.signed_in)
        %span.user= model.user
      - else
        %a(href="/login") Sign in
      _ yield
    %footer
      _ render 'footer'
"#;

    c.bench_function("parse_layout_template", |b| {
        b.iter(|| parse(black_box(source)))
    });
}

fn parse_large_template(c: &mut Criterion) {
    let mut source = String::from("%ul.items\n");
    for i in 0..200 {
        source.push_str(&format!("  %li.item#item{}= model.items[{}]\n", i, i));
    }

    c.bench_function("parse_large_template", |b| {
        b.iter(|| parse(black_box(&source)))
    });
}

criterion_group!(
    benches,
    parse_simple_template,
    parse_layout_template,
    parse_large_template
);
criterion_main!(benches);
