//! Session benchmarks.
//!
//! Drives sessions over in-memory collaborators: one inbound event in, the
//! resulting broadcast drained from every outbox.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use huddle_bench::group_hub;
use huddle_core::{Hub, Outbox, RoomId, Session};
use huddle_protocol::{ClientEvent, Encoding};
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Runtime;

async fn connect(hub: &Arc<Hub>, room: RoomId, token: &str) -> Option<(Session, Outbox)> {
    let (mut session, outbox) = Session::new(Arc::clone(hub));
    session.accept().ok()?;
    session.authenticate(Some(token)).await.ok()?;
    session.join(room).await.ok()?;
    Some((session, outbox))
}

async fn connect_all(hub: &Arc<Hub>, room: RoomId, members: usize) -> (Vec<Session>, Vec<Outbox>) {
    let mut sessions = Vec::with_capacity(members);
    let mut outboxes = Vec::with_capacity(members);
    for i in 0..members {
        if let Some((session, outbox)) = connect(hub, room, &format!("user-{i}")).await {
            sessions.push(session);
            outboxes.push(outbox);
        }
    }
    (sessions, outboxes)
}

fn drain(outboxes: &mut [Outbox]) {
    for outbox in outboxes {
        while outbox.try_recv().is_some() {}
    }
}

/// Send a message and read it back from every member.
fn bench_send_message(c: &mut Criterion) {
    let mut group = c.benchmark_group("session");
    let Ok(rt) = Runtime::new() else {
        return;
    };

    for members in [2usize, 10, 50] {
        group.bench_function(format!("send_message_{members}"), |b| {
            b.iter_custom(|iters| {
                rt.block_on(async {
                    let (hub, room) = group_hub(members);
                    let (mut sessions, mut outboxes) = connect_all(&hub, room, members).await;
                    drain(&mut outboxes);

                    let start = Instant::now();
                    for _ in 0..iters {
                        let _ = black_box(
                            sessions[0]
                                .handle(ClientEvent::text("benchmark message"))
                                .await,
                        );
                        drain(&mut outboxes);
                    }
                    start.elapsed()
                })
            });
        });
    }

    group.finish();
}

/// Decode and handle a raw typing frame.
fn bench_handle_raw(c: &mut Criterion) {
    let mut group = c.benchmark_group("session");
    let Ok(rt) = Runtime::new() else {
        return;
    };
    let frame = br#"{"action":"typing","is_typing":true}"#;

    group.bench_function("handle_raw_typing", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let (hub, room) = group_hub(10);
                let (mut sessions, mut outboxes) = connect_all(&hub, room, 10).await;

                let start = Instant::now();
                for _ in 0..iters {
                    let _ = black_box(sessions[0].handle_raw(frame, Encoding::Json).await);
                    drain(&mut outboxes);
                }
                start.elapsed()
            })
        });
    });

    group.finish();
}

criterion_group!(benches, bench_send_message, bench_handle_raw);
criterion_main!(benches);
