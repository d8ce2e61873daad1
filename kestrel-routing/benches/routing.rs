//! Hot-path benchmarks for the bindings table.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kestrel_core::{Filter, Message, MessageLoadBalancing};
use kestrel_routing::binding::{Binding, BindingId, BindingKind};
use kestrel_routing::context::{RoutingContext, StandardRoutingContext};
use kestrel_routing::table::AddressBindings;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A binding that only counts deliveries, so long benchmark runs do not
/// accumulate per-message state.
#[derive(Debug)]
struct CountingBinding {
    id: BindingId,
    unique_name: String,
    delivered: AtomicU64,
}

impl CountingBinding {
    fn new(id: u64) -> Self {
        Self {
            id: BindingId::new(id),
            unique_name: format!("q{id}"),
            delivered: AtomicU64::new(0),
        }
    }
}

impl Binding for CountingBinding {
    fn id(&self) -> BindingId {
        self.id
    }

    fn unique_name(&self) -> &str {
        &self.unique_name
    }

    fn routing_name(&self) -> &str {
        "bench"
    }

    fn cluster_name(&self) -> &str {
        &self.unique_name
    }

    fn filter(&self) -> Option<&dyn Filter> {
        None
    }

    fn kind(&self) -> BindingKind {
        BindingKind::LocalQueue
    }

    fn is_exclusive(&self) -> bool {
        false
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn is_high_accept_priority(&self, _message: &Message) -> bool {
        true
    }

    fn route(
        &self,
        _message: &Message,
        context: &mut dyn RoutingContext,
    ) -> kestrel_routing::Result<()> {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        context.record_route(self.id, false);
        Ok(())
    }

    fn route_with_ack(
        &self,
        _message: &Message,
        context: &mut dyn RoutingContext,
    ) -> kestrel_routing::Result<()> {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        context.record_route(self.id, true);
        Ok(())
    }

    fn unproposed(&self, _group_id: &str) {}
}

fn build_table(binding_count: u64) -> AddressBindings {
    let table = AddressBindings::new("bench", None);
    for id in 1..=binding_count {
        table.add(Arc::new(CountingBinding::new(id)));
    }
    table.set_load_balancing(MessageLoadBalancing::Strict);
    table
}

fn bench_simple_route(c: &mut Criterion) {
    let mut group = c.benchmark_group("route");

    for binding_count in [2u64, 4, 16] {
        let table = build_table(binding_count);
        group.bench_function(format!("round_robin_{binding_count}"), |b| {
            let mut ctx = StandardRoutingContext::new();
            b.iter(|| {
                let mut msg = Message::new("bench", Bytes::from_static(b"x")).unwrap();
                table.route(black_box(&mut msg), &mut ctx).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_reusable_context(c: &mut Criterion) {
    let table = build_table(1);
    let mut msg = Message::new("bench", Bytes::from_static(b"x")).unwrap();

    c.bench_function("route/reusable_context", |b| {
        let mut ctx = StandardRoutingContext::new();
        table.route(&mut msg, &mut ctx).unwrap();
        b.iter(|| {
            table.route(black_box(&mut msg), &mut ctx).unwrap();
        });
    });
}

criterion_group!(benches, bench_simple_route, bench_reusable_context);
criterion_main!(benches);
