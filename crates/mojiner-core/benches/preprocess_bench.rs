use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mojiner_core::{DynamicPreprocessor, ScriptRunAnalyzer, StaticPreprocessor};

fn corpus() -> (Vec<Vec<String>>, Vec<Vec<String>>) {
    let texts = [
        "東京タワーへ2回行った",
        "大阪城のチケットを買う",
        "山田さんはＡＢＣ社に勤める",
        "京都駅から新幹線で名古屋へ",
        "2024年にパリで会議がある",
    ];
    let docs: Vec<Vec<String>> = texts
        .iter()
        .map(|t| t.chars().map(String::from).collect())
        .collect();
    let labels = docs
        .iter()
        .map(|doc| doc.iter().map(|_| "O".to_string()).collect())
        .collect();
    (docs, labels)
}

fn bench_preprocess(c: &mut Criterion) {
    let (docs, labels) = corpus();
    let mut preprocessor = StaticPreprocessor::default();
    preprocessor
        .fit(&ScriptRunAnalyzer, &docs, &labels)
        .unwrap();
    let dynamic = DynamicPreprocessor::new(preprocessor.n_labels());

    c.bench_function("static_transform_single", |b| {
        b.iter(|| {
            preprocessor
                .transform(&ScriptRunAnalyzer, black_box(&docs[..1]), None)
                .unwrap()
        });
    });

    c.bench_function("full_batch_5", |b| {
        b.iter(|| {
            let encoded = preprocessor
                .transform(&ScriptRunAnalyzer, black_box(&docs), Some(labels.as_slice()))
                .unwrap();
            dynamic
                .transform(&encoded.features, encoded.labels.as_deref())
                .unwrap()
        });
    });
}

criterion_group!(benches, bench_preprocess);
criterion_main!(benches);
