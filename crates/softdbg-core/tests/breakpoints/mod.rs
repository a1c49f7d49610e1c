use std::sync::{Arc, Mutex};

use softdbg_core::breakpoint::{BreakpointId, BreakpointKind, BreakpointRegistry};
use softdbg_core::breakpoint::{BreakpointStatus, SourceLocation};
use softdbg_core::dispatcher::{self, TriggerConfig};
use softdbg_core::handler::BreakpointObserver;
use softdbg_core::session::Notification;
use softdbg_vm::ScriptedVm;
use test_log::test;

use crate::common::{base_script, death, main_thread, worker_thread};

#[derive(Clone, Default)]
struct HitLog(Arc<Mutex<Vec<(BreakpointId, u64)>>>);

impl BreakpointObserver for HitLog {
    fn hit_count_changed(&mut self, id: BreakpointId, hit_count: u64) {
        self.0.lock().unwrap().push((id, hit_count));
    }
}

fn hit(thread: softdbg_vm::VmThread, id: BreakpointId) -> Notification<softdbg_vm::VmThread> {
    Notification::Breakpoint {
        thread,
        breakpoint: Some(id),
    }
}

#[test(tokio::test(start_paused = true))]
async fn breakpoint_notifications_update_hit_counts() {
    let mut registry = BreakpointRegistry::<ScriptedVm>::new();
    let hits = HitLog::default();
    registry.add_observer(hits.clone());

    let loop_bp = registry.insert(SourceLocation::new("Program.cs", 12), BreakpointKind::Breakpoint);
    let other_bp = registry.insert(
        SourceLocation::new("Worker.cs", 3),
        BreakpointKind::Tracepoint {
            expression: "count".to_owned(),
        },
    );

    let script = base_script()
        .with_batch([hit(main_thread(), loop_bp)])
        .with_batch([hit(worker_thread(), other_bp), hit(main_thread(), loop_bp)])
        .with_batch([hit(main_thread(), BreakpointId::from(99))])
        .with_batch([death(0)]);

    let vm = Arc::new(ScriptedVm::new(script).unwrap());
    let registry = Arc::new(tokio::sync::Mutex::new(registry));

    let dispatcher = dispatcher::builder()
        .with_session(vm.clone())
        .with_break_handler(())
        .with_registry(registry.clone())
        .with_triggers(TriggerConfig::default())
        .build();

    dispatcher.run().await.unwrap();

    let registry = registry.lock().await;
    assert_eq!(registry.get(loop_bp).unwrap().hit_count(), 2);
    assert_eq!(registry.get(other_bp).unwrap().hit_count(), 1);

    assert_eq!(
        *hits.0.lock().unwrap(),
        [(loop_bp, 1), (other_bp, 1), (loop_bp, 2)]
    );

    // breakpoints don't hold the target
    assert_eq!(vm.resume_count(), 3);
}

#[test(tokio::test)]
async fn session_applies_adjusted_location_on_attach() {
    let vm = Arc::new(ScriptedVm::new(base_script()).unwrap());

    let mut registry = BreakpointRegistry::<ScriptedVm>::new();
    let id = registry.insert(SourceLocation::new("Program.cs", 12), BreakpointKind::Breakpoint);

    registry.adjust_location(id, 14).unwrap();
    assert!(vm.adjusted_locations().is_empty());

    registry.attach(id, vm.clone()).unwrap();
    registry.set_status(id, BreakpointStatus::Bound, "").unwrap();
    assert_eq!(vm.adjusted_locations(), [(id, 14)]);

    // the pending line isn't applied again
    registry.attach(id, vm.clone()).unwrap();
    assert_eq!(vm.adjusted_locations(), [(id, 14)]);

    registry.adjust_location(id, 20).unwrap();
    assert_eq!(vm.adjusted_locations(), [(id, 14), (id, 20)]);

    registry.detach(id).unwrap();
    assert_eq!(registry.get(id).unwrap().status(), BreakpointStatus::Disconnected);
    assert_eq!(registry.get(id).unwrap().location().line, 12);
}
