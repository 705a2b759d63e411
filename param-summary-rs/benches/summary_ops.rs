use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use param_summary_rs::{
    reduce, HierarchyBuilder, NamingRule, Pipeline, RawLayerRecord, ReduceMode, ReduceOptions,
    SummaryConfig, TensorData,
};

fn weights(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| ((i * 7919 % 1009) as f32 / 1009.0 - 0.5) * 0.2)
        .collect()
}

/// Names for a BERT-base sized model: 12 blocks of six linear layers plus heads.
fn bert_names(blocks: usize) -> Vec<String> {
    let members = [
        "attention.self.query",
        "attention.self.key",
        "attention.self.value",
        "attention.output.dense",
        "intermediate.dense",
        "output.dense",
    ];
    let mut names: Vec<String> = (0..blocks)
        .flat_map(|b| {
            members
                .iter()
                .map(move |m| format!("bert.encoder.layer.{b}.{m}"))
        })
        .collect();
    names.push("bert.pooler.dense".into());
    names.push("qa_outputs".into());
    names
}

fn bench_reduce(c: &mut Criterion) {
    let mut group = c.benchmark_group("reduce");

    for len in [768, 768 * 64, 768 * 768] {
        let values = weights(len);
        group.bench_with_input(BenchmarkId::new("truncate", len), &values, |b, values| {
            let options = ReduceOptions::default();
            b.iter(|| black_box(reduce(black_box(values), &options).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("kde", len), &values, |b, values| {
            let options = ReduceOptions {
                mode: ReduceMode::Kde,
                ..Default::default()
            };
            b.iter(|| black_box(reduce(black_box(values), &options).unwrap()));
        });
    }

    group.finish();
}

fn bench_hierarchy(c: &mut Criterion) {
    let rule = NamingRule::default();
    let names = bert_names(12);
    let levels: Vec<_> = names
        .iter()
        .map(|n| rule.decompose(n).unwrap().levels)
        .collect();

    c.bench_function("hierarchy_insert_all_bert_base", |b| {
        b.iter(|| {
            let mut builder = HierarchyBuilder::new(&rule);
            black_box(builder.insert_all(black_box(&levels)).unwrap());
            black_box(builder.finish());
        });
    });
}

fn bench_summarize(c: &mut Criterion) {
    let records: Vec<RawLayerRecord> = bert_names(12)
        .into_iter()
        .map(|name| {
            RawLayerRecord::new(name)
                .with_tensor("weights", TensorData::vector(weights(768 * 64)))
                .with_tensor("bias", TensorData::vector(weights(768)))
        })
        .collect();

    let mut group = c.benchmark_group("summarize");
    for parallel in [false, true] {
        let mut config = SummaryConfig::bert_kde_preset();
        config.reduce.parallel = parallel;
        let pipeline = Pipeline::new(config).unwrap();
        let label = if parallel { "parallel" } else { "sequential" };
        group.bench_function(label, |b| {
            b.iter(|| black_box(pipeline.summarize(black_box(&records)).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_reduce, bench_hierarchy, bench_summarize);
criterion_main!(benches);
