//! Mutual Exclusion Tests - several clients sharing one share root and server
//!
//! A deterministic pseudo-random schedule opens and closes sessions, with
//! occasional network failures during checkin. After every step at most one
//! client may be writing, and the server's lease must belong to whoever holds
//! a lease record locally.

mod common;

use std::fs;
use std::sync::Arc;

use common::{FakeArbiter, FakeServer, Fixture, ScriptedDecider};
use leasesync::state::LeaseStore;
use leasesync::{CommitOutcome, OpenStatus, SyncCoordinator};

struct Client {
	name: &'static str,
	arbiter: Arc<FakeArbiter>,
	decider: Arc<ScriptedDecider>,
	session: Option<SyncCoordinator>,
}

fn persisted_keys(fx: &Fixture, clients: &[Client]) -> Vec<String> {
	clients
		.iter()
		.filter_map(|c| LeaseStore::new(fx.context(c.name).paths.lease).load_if_present().unwrap())
		.filter(|r| r.held)
		.map(|r| r.key)
		.collect()
}

#[tokio::test]
async fn test_at_most_one_writer_across_clients() {
	let fx = Fixture::new();
	fx.allow(&["ann", "bob", "cat"]);
	fx.snapshot("db1.zip", "v1");
	let server = FakeServer::new("db1.zip");

	let mut clients: Vec<Client> = ["ann", "bob", "cat"]
		.into_iter()
		.map(|name| Client {
			name,
			arbiter: server.arbiter(),
			decider: ScriptedDecider::new().shared(),
			session: None,
		})
		.collect();

	let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
	let mut next = move || {
		seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
		(seed >> 33) as usize
	};

	let mut commits = 0;

	for step in 0..80 {
		let i = next() % clients.len();
		let inject_failure = next() % 5 == 0;
		let client = &mut clients[i];

		match client.session.take() {
			None => {
				let mut c = fx.coordinator(fx.context(client.name), &client.arbiter, &client.decider, true);
				let opened = c.open().await.unwrap();
				if opened.status == OpenStatus::Recovered {
					assert!(!c.is_read_only(), "step {}: recovered session must be writable", step);
				}
				if !c.is_read_only() {
					let version = format!("{} step {}", client.name, step);
					fs::write(c.mirror_root().join("content.txt"), version).unwrap();
				}
				client.session = Some(c);
			}
			Some(mut c) => {
				if inject_failure && !c.is_read_only() {
					client.arbiter.fail_next(1);
				}
				match c.shutdown_and_commit().await.unwrap() {
					CommitOutcome::Committed { .. } => commits += 1,
					CommitOutcome::Deferred | CommitOutcome::NothingToCommit => {}
					other => panic!("step {}: unexpected outcome {:?}", step, other),
				}
			}
		}

		let writers: Vec<String> = clients
			.iter()
			.filter_map(|c| c.session.as_ref())
			.filter(|s| !s.is_read_only())
			.filter_map(|s| s.lease().map(|l| l.key.clone()))
			.collect();
		assert!(writers.len() <= 1, "step {}: writers {:?}", step, writers);

		let holder_key = server.holder().map(|(key, _)| key);
		if let Some(key) = writers.first() {
			assert_eq!(holder_key.as_ref(), Some(key), "step {}", step);
		}

		let persisted = persisted_keys(&fx, &clients);
		assert!(persisted.len() <= 1, "step {}: records {:?}", step, persisted);
		assert_eq!(persisted.first(), holder_key.as_ref(), "step {}", step);
	}

	for client in clients.iter_mut() {
		if let Some(mut c) = client.session.take() {
			c.shutdown_and_commit().await.unwrap();
		}
	}

	assert!(commits > 0);
	let current = server.current();
	assert!(fx.share.join(&current).exists(), "current snapshot {} missing", current);
}

// vim: ts=4
