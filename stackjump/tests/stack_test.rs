#![cfg(target_family = "unix")]

use stackjump::stack::*;
use stackjump::Error;

#[test]
fn create_1_mb_stack() -> Result<(), Error> {
    let stack = GuardedStack::new(16 * 1024, 1024 * 1024)?;
    assert_eq!(stack.size(), 1024 * 1024);
    assert!(stack.committed() >= 16 * 1024);
    Ok(())
}

#[test]
fn reserve_is_rounded_up_to_page_size() -> Result<(), Error> {
    let page = page_size();
    let stack = GuardedStack::new(1, page + 1)?;
    assert_eq!(stack.size(), 2 * page);
    assert_eq!(stack.committed(), page);
    assert_eq!(stack.bottom() as usize % page, 0);
    assert_eq!(stack.bottom() as usize - stack.top() as usize, stack.size());
    Ok(())
}

#[test]
fn commit_is_clamped_to_reserve() -> Result<(), Error> {
    let page = page_size();
    let stack = GuardedStack::new(8 * page, 2 * page)?;
    assert_eq!(stack.committed(), 2 * page);
    Ok(())
}

#[test]
fn whole_usable_area_is_writable() -> Result<(), Error> {
    let stack = GuardedStack::new(0, 64 * 1024)?;
    unsafe {
        *stack.top() = 1;
        *stack.bottom().sub(1) = 2;
        assert_eq!(*stack.top(), 1);
        assert_eq!(*stack.bottom().sub(1), 2);
    }
    assert!(stack.contains(stack.top()));
    assert!(stack.contains(unsafe { stack.bottom().sub(1) }));
    assert!(!stack.contains(stack.bottom()));
    assert!(!stack.contains(unsafe { stack.top().sub(1) }));
    Ok(())
}

#[test]
fn committed_area_is_zeroed() -> Result<(), Error> {
    let stack = GuardedStack::new(8 * 1024, 64 * 1024)?;
    let committed = unsafe {
        std::slice::from_raw_parts(stack.bottom().sub(stack.committed()), stack.committed())
    };
    assert!(committed.iter().all(|byte| *byte == 0));
    Ok(())
}

#[test]
fn decommit_keeps_bottom_of_stack() -> Result<(), Error> {
    let page = page_size();
    let mut stack = GuardedStack::new(16 * page, 16 * page)?;
    unsafe {
        *stack.bottom().sub(1) = 0xAB;
        *stack.top() = 0xCD;
    }

    stack.decommit(page)?;
    assert_eq!(stack.committed(), page);
    unsafe {
        assert_eq!(*stack.bottom().sub(1), 0xAB);
        // Anonymous private pages come back zeroed after MADV_DONTNEED on Linux, other systems
        // only promise the content is undefined.
        if cfg!(target_os = "linux") {
            assert_eq!(*stack.top(), 0);
        }
        // Still mapped and writable.
        *stack.top() = 1;
    }
    Ok(())
}

#[test]
fn decommit_everything_kept_is_noop() -> Result<(), Error> {
    let page = page_size();
    let mut stack = GuardedStack::new(4 * page, 4 * page)?;
    unsafe { *stack.top() = 7 };
    stack.decommit(4 * page)?;
    stack.decommit(usize::MAX / 2)?;
    stack.decommit(usize::MAX)?;
    stack.decommit(4 * page - 1)?;
    assert_eq!(stack.committed(), 4 * page);
    assert_eq!(unsafe { *stack.top() }, 7);
    Ok(())
}

#[test]
fn reserve_overflowing_address_space_is_an_error() {
    for reserve in [usize::MAX, usize::MAX - page_size() + 2] {
        match GuardedStack::new(0, reserve) {
            Err(Error::Reserve { size, .. }) => assert_eq!(size, reserve),
            other => panic!("expected a reserve error, got {:?}", other.map(|stack| stack.size())),
        }
    }
}

#[test]
fn commit_bigger_than_reserve_is_clamped_without_overflow() -> Result<(), Error> {
    let page = page_size();
    let stack = GuardedStack::new(usize::MAX, page)?;
    assert_eq!(stack.committed(), page);
    Ok(())
}

#[test]
fn create_10k_1_mb_stacks() {
    // Only reserves address space, nothing is committed.
    let mut stacks = vec![];
    for _i in 0..10_000 {
        let stack = GuardedStack::new(0, 1024 * 1024);
        assert!(stack.is_ok());
        stacks.push(stack);
    }
}
