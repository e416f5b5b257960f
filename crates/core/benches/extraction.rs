use std::time::Instant;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use folio_core::{
    AnalysisConfig, ContentScorer, ContentSelector, Document, MetaExtractor, PositionIndex, Session, StaticLayout,
};

fn synthetic_chapter(paragraphs: usize) -> String {
    let body: String = (0..paragraphs)
        .map(|i| format!("<p>Paragraph {i}, where the road bends, the river slows, and the lanterns are lit.</p>"))
        .collect();
    format!(
        r#"<html><head><title>Dawn Road - Chapter 4</title></head><body>
        <nav><a href="/">Home</a></nav><article><h2>Chapter 4</h2>{body}</article></body></html>"#
    )
}

fn laid_out(html: &str) -> (Document, StaticLayout) {
    let doc = Document::parse(html).unwrap();
    let mut layout = StaticLayout::new();
    layout.flow(doc.tree(), doc.body().unwrap());
    (doc, layout)
}

fn bench_parse(c: &mut Criterion) {
    let small = std::fs::read_to_string("../../tests/fixtures/chapter.html").unwrap();
    let medium = synthetic_chapter(200);
    let large = synthetic_chapter(2000);

    let mut group = c.benchmark_group("parse");

    group.bench_with_input(BenchmarkId::new("small", "fixture"), &small, |b, html| {
        b.iter(|| Document::parse(black_box(html)))
    });

    group.bench_with_input(BenchmarkId::new("medium", "200p"), &medium, |b, html| {
        b.iter(|| Document::parse(black_box(html)))
    });

    group.bench_with_input(BenchmarkId::new("large", "2000p"), &large, |b, html| {
        b.iter(|| Document::parse(black_box(html)))
    });

    group.finish();
}

fn bench_full_analysis(c: &mut Criterion) {
    let html = synthetic_chapter(200);
    let config = AnalysisConfig::default();

    c.bench_function("full_analysis", |b| {
        b.iter(|| {
            let mut session = Session::from_html(black_box(&html), None, config.clone()).unwrap();
            session.analyze(Instant::now())
        })
    });
}

fn bench_scoring(c: &mut Criterion) {
    let (doc, layout) = laid_out(&synthetic_chapter(200));
    let config = AnalysisConfig::default();

    c.bench_function("scoring", |b| {
        b.iter(|| ContentScorer::new(black_box(doc.tree()), &layout, &config.score).score())
    });
}

fn bench_selection_and_metadata(c: &mut Criterion) {
    let (doc, layout) = laid_out(&synthetic_chapter(200));
    let config = AnalysisConfig::default();
    let index = PositionIndex::build(doc.tree(), doc.tree().root());
    let outcome = ContentScorer::new(doc.tree(), &layout, &config.score).score().unwrap();

    c.bench_function("selection", |b| {
        b.iter(|| ContentSelector::new(doc.tree(), &layout, &index, black_box(&outcome), &config).select())
    });

    let selection = ContentSelector::new(doc.tree(), &layout, &index, &outcome, &config).select().unwrap();
    c.bench_function("metadata", |b| {
        b.iter(|| MetaExtractor::new(&doc, &layout, &index, &config).extract(selection.start, selection.end))
    });
}

criterion_group!(
    benches,
    bench_parse,
    bench_full_analysis,
    bench_scoring,
    bench_selection_and_metadata
);
criterion_main!(benches);
