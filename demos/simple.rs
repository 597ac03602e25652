//! Simple usage example

use std::thread;
use std::time::Duration;

use turbo_spsc::{channel, PushError};

fn main() -> anyhow::Result<()> {
    println!("Turbo SPSC - Simple Example\n");

    // 16 slots, 15 usable
    let (tx, rx) = channel::<String>(16)?;

    let producer = thread::spawn(move || {
        for i in 0..10 {
            let mut message = format!("Message {i}");
            println!("Sending: {message}");

            // Queue is full, spin and retry
            while let Err(PushError(rejected)) = tx.push(message) {
                message = rejected;
                std::hint::spin_loop();
            }

            // Small delay to make output readable
            thread::sleep(Duration::from_millis(100));
        }
        println!("Producer finished!");
    });

    let consumer = thread::spawn(move || {
        let mut received = 0;
        while received < 10 {
            match rx.pop() {
                Some(message) => {
                    println!("Received: {message}");
                    received += 1;
                }
                None => std::hint::spin_loop(),
            }
        }
        println!("Consumer finished!");
    });

    producer
        .join()
        .map_err(|_| anyhow::anyhow!("producer thread panicked"))?;
    consumer
        .join()
        .map_err(|_| anyhow::anyhow!("consumer thread panicked"))?;

    println!("\nExample completed successfully!");
    Ok(())
}
