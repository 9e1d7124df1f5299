use criterion::{black_box, criterion_group, criterion_main, Criterion};

use sweeper::detector::similarity::{normalize_tokens, score_sources, token_similarity};
use sweeper::parser::Flavor;

fn php_method(name: &str, statements: usize) -> String {
    let mut body = format!("public function {}($order, $customer)\n{{\n", name);
    for i in 0..statements {
        body.push_str(&format!(
            "    $total{} = $order->lines[{}]->price * $customer->discount({});\n",
            i, i, i
        ));
        body.push_str(&format!("    if ($total{} > 100) {{ $order->flag('large'); }}\n", i));
    }
    body.push_str("    return $order;\n}\n");
    body
}

fn bench_score_sources(c: &mut Criterion) {
    let small_a = php_method("charge", 5);
    let small_b = php_method("bill", 5);
    let large_a = php_method("charge", 200);
    let large_b = php_method("bill", 200);

    c.bench_function("score_sources_small", |b| {
        b.iter(|| score_sources(black_box(&small_a), black_box(&small_b), Flavor::Php, true))
    });
    c.bench_function("score_sources_large", |b| {
        b.iter(|| score_sources(black_box(&large_a), black_box(&large_b), Flavor::Php, true))
    });
}

fn bench_token_similarity(c: &mut Criterion) {
    let a = normalize_tokens(&php_method("charge", 100), Flavor::Php, true);
    let b = normalize_tokens(&php_method("refund", 90), Flavor::Php, true);

    c.bench_function("token_similarity", |bench| {
        bench.iter(|| token_similarity(black_box(&a), black_box(&b)))
    });
}

criterion_group!(benches, bench_score_sources, bench_token_similarity);
criterion_main!(benches);
