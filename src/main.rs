//! Ralph - 命令行预约助手
//!
//! 用法: ralph [session-id]
//! 输入 exit 退出，/yolo on|off 切换免审批模式，/retry 在出错后重试。

use anyhow::Context;
use ralph::agent::{SessionReply, SessionService};
use ralph::config::load_config;
use ralph::core::{ReviewDecision, ReviewPrompt, Turn};
use ralph::observability;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};

type Input = Lines<BufReader<Stdin>>;

async fn prompt_line(lines: &mut Input, label: &str) -> anyhow::Result<Option<String>> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(label.as_bytes()).await?;
    stdout.flush().await?;
    Ok(lines.next_line().await?.map(|l| l.trim().to_string()))
}

fn print_turns(turns: &[Turn]) {
    for turn in turns {
        match turn {
            Turn::User { .. } => {}
            Turn::Assistant { text, actions } => {
                if !text.is_empty() {
                    println!("Assistant: {text}");
                }
                for a in actions {
                    println!(
                        "   -> {} {}",
                        a.name,
                        serde_json::Value::Object(a.arguments.clone())
                    );
                }
            }
            Turn::ActionResult {
                action_name,
                result,
                ..
            } => println!("   <- {action_name}: {result}"),
        }
    }
}

fn print_review(prompt: &ReviewPrompt) {
    println!("Approval required for action '{}':", prompt.invocation.name);
    println!(
        "   {}",
        serde_json::Value::Object(prompt.invocation.arguments.clone())
    );
}

/// 读取审批决定；yes/no 等口语输入先归一，其余原样交给审批闸门
async fn read_decision(lines: &mut Input) -> anyhow::Result<Option<ReviewDecision>> {
    let Some(raw) = prompt_line(lines, "Action (continue/reject): ").await? else {
        return Ok(None);
    };
    let mut decision = ReviewDecision::from_cli_input(&raw).unwrap_or(ReviewDecision {
        action: raw,
        data: None,
    });
    if decision.action == "reject" {
        decision.data = prompt_line(lines, "Reason (optional): ")
            .await?
            .filter(|r| !r.is_empty());
    }
    Ok(Some(decision))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let service = SessionService::from_config(&cfg).context("Failed to create session service")?;
    let session_id = std::env::args()
        .nth(1)
        .unwrap_or_else(|| format!("cli-{}", uuid::Uuid::new_v4().simple()));

    println!("Welcome to the appointment assistant (session {session_id}). Type 'exit' to quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shown = 0usize;
    let mut pending = service
        .state(&session_id)
        .await?
        .and_then(|s| service.components().gate.current_prompt(&s));

    loop {
        let result: Result<SessionReply, ralph::core::AgentError> = if let Some(prompt) = &pending {
            print_review(prompt);
            let Some(decision) = read_decision(&mut lines).await? else {
                break;
            };
            service.resume(&session_id, decision).await
        } else {
            let Some(input) = prompt_line(&mut lines, "You: ").await? else {
                break;
            };
            match input.as_str() {
                "" => continue,
                "exit" => break,
                "/yolo on" | "/yolo off" => {
                    let on = input.ends_with("on");
                    service.set_yolo(&session_id, on).await?;
                    println!("YOLO mode {}.", if on { "enabled" } else { "disabled" });
                    continue;
                }
                "/retry" => service.retry(&session_id).await,
                _ => service.send_message(&session_id, &input).await,
            }
        };

        match result {
            Ok(reply) => {
                print_turns(&reply.turns[shown.min(reply.turns.len())..]);
                shown = reply.turns.len();
                pending = reply.review_prompt;
            }
            Err(e) => {
                eprintln!("Error: {e}");
                if let Some(state) = service.state(&session_id).await? {
                    shown = shown.min(state.len());
                    pending = service.components().gate.current_prompt(&state);
                }
            }
        }
    }

    println!("Goodbye!");
    Ok(())
}
