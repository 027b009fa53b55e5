use std::cell::Cell;
use std::ffi::c_void;

use handoff::*;

// A task prints a few steps and hands control back to the scheduler after each one.
struct Task {
    name: &'static str,
    steps: u32,
    scheduler: CoroutineHandle,
    done: Cell<bool>,
}

fn task_main(data: *mut c_void) -> ! {
    let task = unsafe { &*(data as *const Task) };
    for step in 1..=task.steps {
        println!("{}: step {}/{}", task.name, step, task.steps);
        unsafe { switch_to_coroutine(task.scheduler) };
    }

    task.done.set(true);
    // Entry points never return, the scheduler deletes us from its own stack.
    loop {
        unsafe { switch_to_coroutine(task.scheduler) };
    }
}

fn main() {
    let scheduler = convert_thread_to_coroutine(std::ptr::null_mut());

    let tasks: Vec<Task> = [("fetch", 2), ("parse", 4), ("store", 3)]
        .iter()
        .map(|&(name, steps)| Task {
            name,
            steps,
            scheduler,
            done: Cell::new(false),
        })
        .collect();

    let mut running: Vec<(CoroutineHandle, &Task)> = tasks
        .iter()
        .map(|task| {
            let coroutine = create_coroutine(
                DEFAULT_COMMIT_SIZE,
                DEFAULT_RESERVE_SIZE,
                task_main,
                task as *const Task as *mut c_void,
            );
            assert!(coroutine.is_valid(), "couldn't allocate a stack");
            (coroutine, task)
        })
        .collect();

    let mut round = 0;
    while !running.is_empty() {
        round += 1;
        println!("-- round {}", round);
        for (coroutine, _) in running.iter() {
            unsafe { switch_to_coroutine(*coroutine) };
        }

        running.retain(|(coroutine, task)| {
            let mut coroutine = *coroutine;
            if task.done.get() {
                println!("{} finished", task.name);
                unsafe { delete_coroutine(&mut coroutine) };
                false
            } else {
                // Idle between rounds, keep only the pages the task is likely to use.
                unsafe { partial_decommit_coroutine_stack(coroutine, DEFAULT_COMMIT_SIZE) };
                true
            }
        });
    }

    convert_coroutine_to_thread();
}
