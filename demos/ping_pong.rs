use fiberctx::{Fiber, FiberState};
use std::collections::VecDeque;

const ROUNDS: usize = 3;

fn main() -> Result<(), anyhow::Error> {
    let mut ready = VecDeque::new();

    for name in ["ping", "pong"] {
        ready.push_back(Fiber::new(move |s| {
            for round in 0..ROUNDS {
                println!("[fiber {}] {} {}", s.id(), name, round);
                s.suspend();
            }
            println!("[fiber {}] {} done", s.id(), name);
        })?);
    }

    // Round-robin until every fiber has finished
    while let Some(mut fiber) = ready.pop_front() {
        if fiber.resume() == FiberState::Suspended {
            ready.push_back(fiber);
        }
    }

    println!("All fibers completed!");
    Ok(())
}
