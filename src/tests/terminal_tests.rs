/// Tests for routing typed lines between open prompts and the command loop.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::terminal::{hand_to_prompt, prompt_line, Waiters};

fn open_waiters() -> Waiters {
    Arc::new(Mutex::new(Some(VecDeque::new())))
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[test]
fn line_without_prompt_goes_to_commands() {
    let waiters = open_waiters();
    assert_eq!(hand_to_prompt(&waiters, "list".to_string()), Some("list".to_string()));
}

#[tokio::test]
async fn background_prompt_gets_the_next_line() {
    let waiters = open_waiters();
    let prompt = tokio::spawn({
        let waiters = waiters.clone();
        async move { prompt_line(&waiters).await }
    });
    settle().await;

    assert_eq!(hand_to_prompt(&waiters, "y".to_string()), None);
    assert_eq!(prompt.await.unwrap().as_deref(), Some("y"));
    assert_eq!(hand_to_prompt(&waiters, "list".to_string()), Some("list".to_string()));
}

#[tokio::test]
async fn prompts_are_answered_oldest_first() {
    let waiters = open_waiters();
    let first = tokio::spawn({
        let waiters = waiters.clone();
        async move { prompt_line(&waiters).await }
    });
    settle().await;
    let second = tokio::spawn({
        let waiters = waiters.clone();
        async move { prompt_line(&waiters).await }
    });
    settle().await;

    assert_eq!(hand_to_prompt(&waiters, "one".to_string()), None);
    assert_eq!(hand_to_prompt(&waiters, "two".to_string()), None);
    assert_eq!(first.await.unwrap().as_deref(), Some("one"));
    assert_eq!(second.await.unwrap().as_deref(), Some("two"));
}

#[tokio::test]
async fn abandoned_prompt_is_skipped() {
    let waiters = open_waiters();
    let gone = tokio::spawn({
        let waiters = waiters.clone();
        async move { prompt_line(&waiters).await }
    });
    settle().await;
    gone.abort();
    let _ = gone.await;

    assert_eq!(hand_to_prompt(&waiters, "list".to_string()), Some("list".to_string()));
}

#[tokio::test]
async fn closed_input_ends_prompts() {
    let waiters = open_waiters();
    waiters.lock().unwrap().take();
    assert_eq!(prompt_line(&waiters).await, None);
}
