use criterion::{black_box, criterion_group, criterion_main, Criterion};

// Benchmarks for the CPU-bound parts of resolution. Run with:
//    cargo bench

fn bench_generate_fallback(c: &mut Criterion) {
    use favicon_resolver::fallback::generate;

    c.bench_function("fallback_generate", |b| {
        b.iter(|| generate(black_box("example.com")))
    });
}

fn bench_discover_candidates(c: &mut Criterion) {
    use favicon_resolver::discovery::discover;

    let base = url::Url::parse("https://example.com/blog/post").unwrap();
    let mut html = String::from("<html><head><title>Bench</title>");
    for i in 0..50 {
        html.push_str(&format!("<link rel=\"stylesheet\" href=\"/s{}.css\">", i));
        html.push_str(&format!("<link rel=\"icon\" sizes=\"{0}x{0}\" href=\"icons/{0}.png\">", i));
    }
    html.push_str("</head><body></body></html>");

    c.bench_function("discover_candidates", |b| {
        b.iter(|| discover(black_box(&html), &base))
    });
}

fn bench_render_sizes(c: &mut Criterion) {
    use favicon_resolver::output::{render_sizes, DEFAULT_SIZES};

    let icon = favicon_resolver::fallback::generate("example.com");
    c.bench_function("render_sizes", |b| {
        b.iter(|| render_sizes(black_box(&icon), &DEFAULT_SIZES))
    });
}

criterion_group!(
    benches,
    bench_generate_fallback,
    bench_discover_candidates,
    bench_render_sizes
);
criterion_main!(benches);
