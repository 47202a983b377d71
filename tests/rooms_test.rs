/*!
 * Room Synchronizer Integration Tests
 * Cross-room exclusion and exit-handler delivery under real threads.
 */

use multilock::{CancelToken, GenderLock, Lock, RoomSynchronizer};
use parking_lot::Mutex;
use serial_test::serial;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::thread::ThreadId;
use std::time::Duration;

#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
enum Gender {
    Male,
    Female,
}

#[test]
#[serial]
fn test_two_room_exclusion_with_shared_occupancy() {
    let wc = Arc::new(RoomSynchronizer::new([Gender::Male, Gender::Female]));
    let female_entered = Arc::new(AtomicBool::new(false));

    // t1 and t2 share the male room with staggered stays.
    let t1 = {
        let wc = Arc::clone(&wc);
        thread::spawn(move || {
            wc.lock_for(&Gender::Male).lock();
            thread::sleep(Duration::from_millis(300));
            wc.lock_for(&Gender::Male).unlock();
        })
    };
    let t2 = {
        let wc = Arc::clone(&wc);
        thread::spawn(move || {
            wc.lock_for(&Gender::Male).lock();
            thread::sleep(Duration::from_millis(600));
            wc.lock_for(&Gender::Male).unlock();
        })
    };

    // t3 wants the female room and must wait for both.
    let t3 = {
        let wc = Arc::clone(&wc);
        let flag = Arc::clone(&female_entered);
        thread::spawn(move || {
            wc.lock_for(&Gender::Female).lock();
            flag.store(true, Ordering::SeqCst);
            wc.lock_for(&Gender::Female).unlock();
        })
    };

    thread::sleep(Duration::from_millis(150));
    assert_eq!(wc.hold_count(), 2);
    assert!(!female_entered.load(Ordering::SeqCst));

    // After t1 leaves, one male hold remains; t3 still waits.
    thread::sleep(Duration::from_millis(300));
    assert_eq!(wc.hold_count(), 1);
    assert!(!female_entered.load(Ordering::SeqCst));

    t1.join().unwrap();
    t2.join().unwrap();
    t3.join().unwrap();
    assert!(female_entered.load(Ordering::SeqCst));
    assert!(wc.is_free());
}

#[test]
fn test_waiter_can_be_timed_out_of_the_hallway() {
    let wc = Arc::new(RoomSynchronizer::new([Gender::Male, Gender::Female]));
    wc.lock_for(&Gender::Male).lock();

    let waiter = {
        let wc = Arc::clone(&wc);
        thread::spawn(move || {
            let token = CancelToken::new();
            wc.lock_for(&Gender::Female)
                .try_lock_for(Duration::from_millis(100), &token)
                .unwrap()
        })
    };

    assert!(!waiter.join().unwrap());
    assert_eq!(wc.hold_count(), 1);
    wc.lock_for(&Gender::Male).unlock();
}

#[test]
fn test_exit_handler_fires_on_final_release_thread() {
    let wc = Arc::new(GenderLock::new([Gender::Male, Gender::Female]));
    let fired = Arc::new(AtomicU32::new(0));
    let fired_when_free = Arc::new(AtomicBool::new(false));
    let fired_on: Arc<Mutex<Option<ThreadId>>> = Arc::new(Mutex::new(None));

    {
        let fired = Arc::clone(&fired);
        let fired_when_free = Arc::clone(&fired_when_free);
        let fired_on = Arc::clone(&fired_on);
        let wc_inner = Arc::clone(&wc);
        wc.set_exit_handler(&Gender::Female, move || {
            fired.fetch_add(1, Ordering::SeqCst);
            // Runs after the clearing CAS: the room is already empty.
            fired_when_free.store(wc_inner.is_free(), Ordering::SeqCst);
            *fired_on.lock() = Some(thread::current().id());
        });
    }

    let (to_helper, from_main) = mpsc::channel::<()>();
    let (to_main, from_helper) = mpsc::channel::<()>();

    let helper = {
        let wc = Arc::clone(&wc);
        thread::spawn(move || {
            wc.lock_for(&Gender::Female).lock();
            to_main.send(()).unwrap();
            from_main.recv().unwrap();
            // Final release; the handler must run right here.
            wc.lock_for(&Gender::Female).unlock();
            thread::current().id()
        })
    };

    wc.lock_for(&Gender::Female).lock();
    from_helper.recv().unwrap();
    assert_eq!(wc.hold_count(), 2);

    // Main's release is not the last one: no handler yet.
    wc.lock_for(&Gender::Female).unlock();
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    to_helper.send(()).unwrap();
    let helper_id = helper.join().unwrap();

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(fired_when_free.load(Ordering::SeqCst));
    assert_eq!(*fired_on.lock(), Some(helper_id));
}

#[test]
fn test_exit_handler_once_per_occupancy_cycle() {
    let wc = GenderLock::new(["m", "f"]);
    let fired = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&fired);
    wc.set_exit_handler(&"m", move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    for cycle in 1..=10 {
        let m = wc.lock_for(&"m");
        m.lock();
        m.lock();
        m.unlock();
        m.unlock();
        assert_eq!(fired.load(Ordering::SeqCst), cycle);
    }
}

#[test]
fn test_interrupted_hallway_waiter_leaves_cleanly() {
    let wc = Arc::new(RoomSynchronizer::new([Gender::Male, Gender::Female]));
    wc.lock_for(&Gender::Male).lock();

    let token = CancelToken::new();
    let waiter = {
        let wc = Arc::clone(&wc);
        let token = token.clone();
        thread::spawn(move || wc.lock_for(&Gender::Female).lock_interruptibly(&token))
    };

    thread::sleep(Duration::from_millis(100));
    token.cancel();
    assert!(waiter.join().unwrap().is_err());

    // The interrupted waiter left no trace; the male room still holds.
    assert_eq!(wc.hold_count(), 1);
    wc.lock_for(&Gender::Male).unlock();
    assert!(wc.is_free());
}
