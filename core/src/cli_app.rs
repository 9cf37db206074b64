use crate::conversation::ConversationThread;
use crate::ids::UserId;
use crate::models::{time_ago, Post, PostType};
use crate::reference_card::MessageBody;
use colored::*;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

const DEFAULT_API_ADDR: &str = "127.0.0.1:8787";

/// Shared CLI implementation for the `lostfound-cli` binary.
pub fn run(args: Vec<String>) -> anyhow::Result<()> {
    let bin = args
        .first()
        .map(|s| s.as_str())
        .unwrap_or("lostfound-cli")
        .to_string();

    if args.len() < 2 {
        print_usage(&bin);
        return Ok(());
    }

    let command = &args[1];

    match command.as_str() {
        "status" => show_status()?,
        "posts" => {
            let query = args[2..].join(" ");
            list_posts(&query)?;
        }
        "profile" => {
            if args.len() < 4 {
                let usage = format!("Usage: {} profile <user> <name> [email]", bin);
                eprintln!("{}", usage.yellow());
                return Ok(());
            }
            let email = args.get(4).cloned().unwrap_or_default();
            set_profile(&args[2], &args[3], &email)?;
        }
        "conversations" => {
            if args.len() < 3 {
                eprintln!("{}", format!("Usage: {} conversations <user>", bin).yellow());
                return Ok(());
            }
            list_conversations(&args[2])?;
        }
        "send" => {
            if args.len() < 6 {
                eprintln!(
                    "{}",
                    format!("Usage: {} send <user> <to> <post_id> <message>", bin).yellow()
                );
                return Ok(());
            }
            let post_id: u64 = args[4]
                .parse()
                .map_err(|_| anyhow::anyhow!("post_id must be a number"))?;
            let text = args[5..].join(" ");
            send_message(&args[2], &args[3], post_id, &text)?;
        }
        "delete-thread" => {
            if args.len() < 5 {
                eprintln!(
                    "{}",
                    format!("Usage: {} delete-thread <user> <post_id> <counterpart>", bin).yellow()
                );
                return Ok(());
            }
            delete_thread(&args[2], &args[3], &args[4])?;
        }
        _ => {
            eprintln!("{} Unknown command: {}", "✗".red().bold(), command.red());
            print_usage(&bin);
        }
    }

    Ok(())
}

fn print_usage(bin: &str) {
    println!("{}", "Lost & Found CLI".bright_cyan().bold());
    println!();
    println!("{}", "Usage:".bright_white().bold());
    println!("  {} <command> [args]", bin.cyan());
    println!();
    println!("{}", "Commands:".bright_white().bold());
    println!("  {}                                 Show server status", "status".cyan());
    println!("  {} [query]                          List postings", "posts".cyan());
    println!("  {} <user> <name> [email]          Create or update a profile", "profile".cyan());
    println!("  {} <user>                   List a user's conversations", "conversations".cyan());
    println!(
        "  {} <user> <to> <post_id> <message>   Send a message about a posting",
        "send".cyan()
    );
    println!(
        "  {} <user> <post_id> <counterpart> Delete a conversation",
        "delete-thread".cyan()
    );
    println!();
    println!("  Server address: {} (default {})", "LOSTFOUND_API".yellow(), DEFAULT_API_ADDR);
}

fn api_addr() -> String {
    std::env::var("LOSTFOUND_API").unwrap_or_else(|_| DEFAULT_API_ADDR.to_string())
}

/// One HTTP/1.1 request with `Connection: close`; returns status and JSON body
fn request(
    method: &str,
    path: &str,
    user: Option<&str>,
    body: Option<serde_json::Value>,
) -> anyhow::Result<(u16, serde_json::Value)> {
    let addr = api_addr();
    let mut stream = TcpStream::connect(&addr).map_err(|e| {
        anyhow::anyhow!("Could not reach Lost & Found API at {}: {}", addr, e)
    })?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    stream.set_write_timeout(Some(Duration::from_secs(5)))?;

    let payload = body.map(|b| b.to_string()).unwrap_or_default();
    let mut head = format!(
        "{} {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\nContent-Type: application/json\r\nContent-Length: {}\r\n",
        method,
        path,
        addr,
        payload.len()
    );
    if let Some(u) = user {
        head.push_str(&format!("X-User-Id: {}\r\n", u));
    }
    head.push_str("\r\n");

    stream.write_all(head.as_bytes())?;
    stream.write_all(payload.as_bytes())?;

    let mut raw = String::new();
    stream.read_to_string(&mut raw)?;

    let (head, body) = raw
        .split_once("\r\n\r\n")
        .ok_or_else(|| anyhow::anyhow!("Malformed HTTP response"))?;
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| anyhow::anyhow!("Missing HTTP status line"))?;
    let json = serde_json::from_str(body).unwrap_or(serde_json::Value::Null);
    Ok((status, json))
}

/// Print the server's error and exit on non-2xx
fn expect_ok(status: u16, resp: &serde_json::Value) {
    if !(200..300).contains(&status) {
        let error = resp["error"].as_str().unwrap_or("Unknown error");
        eprintln!("{} Error ({}): {}", "✗".red().bold(), status, error.red());
        std::process::exit(1);
    }
}

fn show_status() -> anyhow::Result<()> {
    let (status, resp) = request("GET", "/api/status", None, None)?;
    expect_ok(status, &resp);
    println!(
        "{} {} {}",
        "✓".green().bold(),
        resp["service"].as_str().unwrap_or("?").cyan(),
        resp["version"].as_str().unwrap_or("?").dimmed()
    );
    Ok(())
}

fn list_posts(query: &str) -> anyhow::Result<()> {
    let path = if query.trim().is_empty() {
        "/api/posts".to_string()
    } else {
        format!("/api/posts?q={}", urlencoding::encode(query.trim()))
    };
    let (status, resp) = request("GET", &path, None, None)?;
    expect_ok(status, &resp);

    let posts: Vec<Post> = serde_json::from_value(resp["posts"].clone())?;
    if posts.is_empty() {
        println!("{}", "No posts found".yellow());
        return Ok(());
    }

    println!("{}", format!("Posts ({})", posts.len()).bright_cyan().bold());
    println!("{}", "─".repeat(60).dimmed());
    let now = chrono::Utc::now();
    for post in posts {
        let kind = match post.post_type {
            PostType::Lost => post.post_type.as_str().red(),
            PostType::Found => post.post_type.as_str().green(),
        };
        println!(
            "  #{} [{}] {} {} {}",
            post.id.to_string().cyan(),
            kind,
            post.title.bright_white(),
            format!("({})", post.category.label()).dimmed(),
            time_ago(now, post.created_at).dimmed()
        );
        if let Some(name) = &post.created_by_name {
            println!("      by {} at {}", name.cyan(), post.location.name);
        }
    }
    Ok(())
}

fn set_profile(user: &str, name: &str, email: &str) -> anyhow::Result<()> {
    let body = serde_json::json!({ "name": name, "email": email });
    let (status, resp) = request("PUT", "/api/profile", Some(user), Some(body))?;
    expect_ok(status, &resp);
    println!("{} Profile saved for {}", "✓".green().bold(), user.cyan());
    Ok(())
}

fn list_conversations(user: &str) -> anyhow::Result<()> {
    let (status, resp) = request("GET", "/api/conversations", Some(user), None)?;
    expect_ok(status, &resp);

    let threads: Vec<ConversationThread> = serde_json::from_value(resp["conversations"].clone())?;
    if threads.is_empty() {
        println!("{}", "No conversations yet".yellow());
        return Ok(());
    }

    let me = UserId::new(user)?;
    let now = chrono::Utc::now();
    for thread in threads {
        println!(
            "{} {} {} {}",
            thread.id.dimmed(),
            thread.counterpart.name.bright_cyan().bold(),
            format!("re: {} [{}]", thread.post_title, thread.post_type).white(),
            thread
                .last_message_at
                .map(|t| time_ago(now, t))
                .unwrap_or_else(|| "New".to_string())
                .dimmed()
        );
        for msg in &thread.messages {
            let who = if msg.sender_id == me {
                "you".green()
            } else {
                msg.sender_name.cyan()
            };
            match msg.body() {
                MessageBody::Card(card) => println!(
                    "    {}: {} {} #{}",
                    who,
                    "▣".yellow(),
                    format!("[{}] {}", card.post_type, card.title).yellow(),
                    card.post_id
                ),
                MessageBody::Text(text) => println!("    {}: {}", who, text),
            }
        }
    }
    Ok(())
}

fn send_message(user: &str, to: &str, post_id: u64, text: &str) -> anyhow::Result<()> {
    let body = serde_json::json!({ "to": to, "post_id": post_id, "text": text });
    let (status, resp) = request("POST", "/api/messages", Some(user), Some(body))?;
    expect_ok(status, &resp);
    match resp["message"]["id"].as_u64() {
        Some(id) => println!("{} Message sent! ID: {}", "✓".green().bold(), id.to_string().cyan()),
        None => println!("{} Message sent!", "✓".green().bold()),
    }
    Ok(())
}

fn delete_thread(user: &str, post_id: &str, counterpart: &str) -> anyhow::Result<()> {
    let path = format!(
        "/api/conversations/{}/{}",
        post_id,
        urlencoding::encode(counterpart)
    );
    let (status, resp) = request("DELETE", &path, Some(user), None)?;
    expect_ok(status, &resp);
    println!(
        "{} Deleted {} messages",
        "✓".green().bold(),
        resp["removed"].as_u64().unwrap_or(0).to_string().cyan()
    );
    Ok(())
}
