//! End-to-end actor creation, mailbox delivery, and wake-on-message
//! scenarios driven entirely through the public `Kernel` API.

use kernel_core::actor::Priority;
use kernel_core::message::MessageKind;
use kernel_core::{Kernel, KernelConfig, KernelError};

fn kernel_with_mailbox_capacity(capacity: usize) -> Kernel {
    let config = KernelConfig::builder()
        .with_default_mailbox_capacity(capacity)
        .build()
        .expect("valid configuration");
    Kernel::builder().with_config(config).build().expect("builds")
}

#[test]
fn fifo_delivery_within_a_sender_recipient_pair() {
    let mut kernel = kernel_with_mailbox_capacity(8);
    let a = kernel
        .spawn_actor(kernel_core::ActorId::KERNEL, Priority::Normal, None, None)
        .expect("room for a");
    let b = kernel
        .spawn_actor(kernel_core::ActorId::KERNEL, Priority::Normal, None, None)
        .expect("room for b");

    for payload in [b"x".to_vec(), b"y".to_vec(), b"z".to_vec()] {
        kernel
            .send_message(a, b, MessageKind::Async, Priority::Normal, payload, None, false)
            .expect("delivered");
    }

    let first = kernel.receive_message(b).expect("ok").expect("message");
    let second = kernel.receive_message(b).expect("ok").expect("message");
    let third = kernel.receive_message(b).expect("ok").expect("message");
    assert_eq!(first.payload, b"x");
    assert_eq!(second.payload, b"y");
    assert_eq!(third.payload, b"z");
    assert!(kernel.receive_message(b).expect("ok").is_none());
}

#[test]
fn blocked_actor_wakes_and_is_requeued_on_delivery() {
    let mut kernel = kernel_with_mailbox_capacity(8);
    let a = kernel
        .spawn_actor(kernel_core::ActorId::KERNEL, Priority::Normal, None, None)
        .expect("room for a");
    let b = kernel
        .spawn_actor(kernel_core::ActorId::KERNEL, Priority::Normal, None, None)
        .expect("room for b");

    // Dispatch b so it is Running, then have it block on its empty mailbox.
    while kernel.dispatch().expect("schedule ok") != Some(b) {
        kernel.yield_current().expect("yield ok");
    }
    kernel.block_current_for_message().expect("block ok");
    assert_eq!(
        kernel.actors().get(b).expect("b exists").state,
        kernel_core::actor::ActorState::Blocked
    );

    kernel
        .send_message(a, b, MessageKind::Async, Priority::Normal, b"ping".to_vec(), None, false)
        .expect("delivered");

    assert_eq!(
        kernel.actors().get(b).expect("b exists").state,
        kernel_core::actor::ActorState::Ready
    );
    let message = kernel.receive_message(b).expect("ok").expect("message");
    assert_eq!(message.payload, b"ping");
}

#[test]
fn third_send_into_a_full_mailbox_is_rejected_without_losing_pool_accounting() {
    let mut kernel = kernel_with_mailbox_capacity(2);
    let a = kernel
        .spawn_actor(kernel_core::ActorId::KERNEL, Priority::Normal, None, None)
        .expect("room for a");
    let b = kernel
        .spawn_actor(kernel_core::ActorId::KERNEL, Priority::Normal, None, None)
        .expect("room for b");

    kernel
        .send_message(a, b, MessageKind::Async, Priority::Normal, b"m1".to_vec(), None, false)
        .expect("first fits");
    kernel
        .send_message(a, b, MessageKind::Async, Priority::Normal, b"m2".to_vec(), None, false)
        .expect("second fits");
    let occupancy_before = kernel.actors().pool_occupancy();

    let result = kernel.send_message(a, b, MessageKind::Async, Priority::Normal, b"m3".to_vec(), None, false);
    assert_eq!(result, Err(KernelError::MailboxFull(b)));
    assert_eq!(kernel.actors().pool_occupancy(), occupancy_before);

    let first = kernel.receive_message(b).expect("ok").expect("message");
    let second = kernel.receive_message(b).expect("ok").expect("message");
    assert_eq!(first.payload, b"m1");
    assert_eq!(second.payload, b"m2");
    assert!(kernel.receive_message(b).expect("ok").is_none());
}

#[test]
fn broadcast_delivers_an_independent_copy_to_every_live_recipient() {
    let mut kernel = kernel_with_mailbox_capacity(8);
    let sender = kernel
        .spawn_actor(kernel_core::ActorId::KERNEL, Priority::Normal, None, None)
        .expect("room");
    let recipients: Vec<_> = (0..3)
        .map(|_| {
            kernel
                .spawn_actor(kernel_core::ActorId::KERNEL, Priority::Normal, None, None)
                .expect("room")
        })
        .collect();

    let delivered = kernel.broadcast_message(sender, &recipients, Priority::Normal, b"hello");
    assert_eq!(delivered, recipients);
    for recipient in recipients {
        let message = kernel.receive_message(recipient).expect("ok").expect("message");
        assert_eq!(message.payload, b"hello");
    }
}

#[test]
fn creating_the_257th_actor_is_rejected() {
    let mut kernel = Kernel::builder().build().expect("builds");
    // Slot 0 is the reserved kernel actor; 255 more slots remain.
    for _ in 0..255 {
        kernel
            .spawn_actor(kernel_core::ActorId::KERNEL, Priority::Normal, None, None)
            .expect("room remains");
    }
    let result = kernel.spawn_actor(kernel_core::ActorId::KERNEL, Priority::Normal, None, None);
    assert_eq!(result, Err(KernelError::NoFreeSlot));
}

#[test]
fn terminate_releases_the_slot_the_mailbox_and_the_ready_queue_entry() {
    let mut kernel = kernel_with_mailbox_capacity(4);
    let a = kernel
        .spawn_actor(kernel_core::ActorId::KERNEL, Priority::Normal, None, None)
        .expect("room for a");
    let b = kernel
        .spawn_actor(kernel_core::ActorId::KERNEL, Priority::Normal, None, None)
        .expect("room for b");
    kernel
        .send_message(a, b, MessageKind::Async, Priority::Normal, b"queued".to_vec(), None, false)
        .expect("delivered");

    kernel.terminate_actor(b);

    assert!(!kernel.actors().contains(b));
    assert_ne!(kernel.current_actor(), Some(b));

    let reused = kernel
        .spawn_actor(kernel_core::ActorId::KERNEL, Priority::Normal, None, None)
        .expect("slot reusable");
    assert_eq!(reused, b);
}
