use criterion::{black_box, criterion_group, criterion_main, Criterion};
use langgraph_core::StateGraph;
use serde_json::json;

fn linear_graph_invoke_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("linear graph invoke (3 nodes)", |b| {
        b.to_async(&runtime).iter(|| async {
            let mut graph = StateGraph::new();
            graph.add_node("a", |state| Box::pin(async move { Ok(state) }));
            graph.add_node("b", |state| Box::pin(async move { Ok(state) }));
            graph.add_node("c", |state| Box::pin(async move { Ok(state) }));
            graph.add_edge("__start__", "a");
            graph.add_edge("a", "b");
            graph.add_edge("b", "c");
            graph.add_edge("c", "__end__");

            let compiled = graph.compile().unwrap();
            compiled
                .invoke(black_box(json!({"counter": 0})))
                .await
                .unwrap();
        });
    });
}

fn parallel_graph_invoke_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("parallel fan-out graph invoke (4 branches)", |b| {
        b.to_async(&runtime).iter(|| async {
            let mut graph = StateGraph::new();
            graph.add_node("start", |state| Box::pin(async move { Ok(state) }));
            for branch in ["w1", "w2", "w3", "w4"] {
                graph.add_node(branch, |state| Box::pin(async move { Ok(state) }));
                graph.add_edge("start", branch);
                graph.add_edge(branch, "join");
            }
            graph.add_node("join", |state| Box::pin(async move { Ok(state) }));
            graph.add_edge("__start__", "start");
            graph.add_edge("join", "__end__");

            let compiled = graph.compile().unwrap();
            compiled
                .invoke(black_box(json!({"items": [1, 2, 3, 4]})))
                .await
                .unwrap();
        });
    });
}

criterion_group!(benches, linear_graph_invoke_benchmark, parallel_graph_invoke_benchmark);
criterion_main!(benches);
