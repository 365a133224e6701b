//! Interactive chat room.
//!
//! Prints room events as they arrive and sends each stdin line as a
//! message. Lines starting with `/` are commands (see `ChatArgs`).

use tokio::io::{AsyncBufReadExt, BufReader};

use andromeda_core::{
    ChannelState, ChatMessage, MessageId, PresenceStatus, ReadReceipt, RoomEvent, TypingIndicator,
};

use crate::cli::{ChatArgs, GlobalOpts};
use crate::config::Context;
use crate::error::CliError;
use crate::output;

use super::require_login;

// ── Input parsing ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum ChatInput {
    Message(String),
    Reply { to: MessageId, content: String },
    Read(MessageId),
    ToggleTyping,
    Quit,
    Empty,
}

fn parse_input(line: &str) -> Result<ChatInput, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(ChatInput::Empty);
    }
    let Some(command) = line.strip_prefix('/') else {
        return Ok(ChatInput::Message(line.to_owned()));
    };

    let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
    let rest = rest.trim();
    match name {
        "quit" | "q" => Ok(ChatInput::Quit),
        "typing" => Ok(ChatInput::ToggleTyping),
        "read" => parse_id(rest).map(ChatInput::Read),
        "reply" => {
            let (id, content) = rest.split_once(' ').unwrap_or((rest, ""));
            let content = content.trim();
            if content.is_empty() {
                return Err("usage: /reply <message-id> <text>".into());
            }
            Ok(ChatInput::Reply {
                to: parse_id(id)?,
                content: content.to_owned(),
            })
        }
        other => Err(format!(
            "unknown command '/{other}' (try /typing, /read, /reply, /quit)"
        )),
    }
}

fn parse_id(raw: &str) -> Result<MessageId, String> {
    raw.parse()
        .map_err(|_| format!("'{raw}' is not a message id"))
}

// ── Handler ─────────────────────────────────────────────────────────

#[allow(clippy::too_many_lines)]
pub async fn handle(ctx: &Context, args: ChatArgs, global: &GlobalOpts) -> Result<(), CliError> {
    require_login(ctx)?;

    let realtime = ctx.client.realtime();
    let color = output::should_color(&global.color);
    let me = ctx.client.session().current_user().map(|u| u.id);

    // Subscribe before connecting so nothing is missed
    let mut messages = realtime.messages();
    let mut typing = realtime.typing();
    let mut receipts = realtime.read_receipts();
    let mut presence = realtime.presence();
    let mut state = realtime.watch_chat_state();

    realtime.connect_chat(args.room);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut opened = false;
    let mut typing_on = false;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            biased;

            _ = &mut ctrl_c => break,

            Ok(()) = state.changed() => {
                match *state.borrow_and_update() {
                    ChannelState::Open => {
                        opened = true;
                        if !global.quiet {
                            eprintln!("Joined room {}. Type to chat, /quit to leave.", args.room);
                        }
                    }
                    // Chat channels never reconnect
                    ChannelState::Closed if opened => {
                        return Err(CliError::ChannelClosed {
                            reason: format!("room {} connection closed", args.room),
                        });
                    }
                    ChannelState::Closed => {
                        return Err(CliError::ConnectionFailed {
                            url: ctx.client.config().ws_url.to_string(),
                            source: format!("could not join room {}", args.room).into(),
                        });
                    }
                    ChannelState::Connecting => {}
                }
            }

            Some(event) = messages.recv() => {
                let line = output::render_event(&global.output, &event, |e| format_message(e, color))?;
                output::print_output(&line, global.quiet);
            }

            Some(event) = typing.recv() => {
                if Some(event.event.user_id) != me {
                    let line = output::render_event(&global.output, &event, format_typing)?;
                    output::print_output(&line, global.quiet);
                }
            }

            Some(event) = receipts.recv() => {
                let line = output::render_event(&global.output, &event, |e| format_receipt(e, color))?;
                output::print_output(&line, global.quiet);
            }

            Some(event) = presence.recv() => {
                let line = output::render_event(&global.output, &event, format_presence)?;
                output::print_output(&line, global.quiet);
            }

            // Only read input once the room is joined
            line = lines.next_line(), if opened => {
                let Some(line) = line? else { break };
                let input = match parse_input(&line) {
                    Ok(input) => input,
                    Err(hint) => {
                        eprintln!("{hint}");
                        continue;
                    }
                };

                let sent = match input {
                    ChatInput::Empty => true,
                    ChatInput::Quit => break,
                    ChatInput::ToggleTyping => {
                        typing_on = !typing_on;
                        realtime.send_typing(typing_on)
                    }
                    ChatInput::Read(id) => realtime.mark_message_read(id),
                    ChatInput::Message(content) => realtime.send_chat_message(content, None),
                    ChatInput::Reply { to, content } => realtime.send_chat_message(content, Some(to)),
                };
                if !sent {
                    eprintln!("Not connected; input dropped");
                }
            }
        }
    }

    if typing_on {
        realtime.send_typing(false);
    }
    realtime.disconnect_chat();
    Ok(())
}

// ── Formatting ──────────────────────────────────────────────────────

fn format_message(event: &RoomEvent<ChatMessage>, color: bool) -> String {
    let msg = &event.event;
    let id = output::muted(&format!("#{}", msg.message_id), color);
    let reply = msg
        .reply_to
        .map(|to| output::muted(&format!(" (reply to #{to})"), color))
        .unwrap_or_default();
    format!(
        "{id} {}{reply}: {}",
        output::accent(&msg.sender_username, color),
        msg.content
    )
}

fn format_typing(event: &RoomEvent<TypingIndicator>) -> String {
    let indicator = &event.event;
    if indicator.is_typing {
        format!("{} is typing...", indicator.username)
    } else {
        format!("{} stopped typing", indicator.username)
    }
}

fn format_receipt(event: &RoomEvent<ReadReceipt>, color: bool) -> String {
    let receipt = &event.event;
    output::muted(
        &format!("user {} read #{}", receipt.user_id, receipt.message_id),
        color,
    )
}

fn format_presence(event: &RoomEvent<PresenceStatus>) -> String {
    let status = &event.event;
    let verb = if status.is_online() { "joined" } else { "left" };
    format!("{} {verb} the room", status.username)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_lines_are_messages() {
        assert_eq!(
            parse_input("  hello there "),
            Ok(ChatInput::Message("hello there".into()))
        );
        assert_eq!(parse_input("   "), Ok(ChatInput::Empty));
    }

    #[test]
    fn slash_commands() {
        assert_eq!(parse_input("/quit"), Ok(ChatInput::Quit));
        assert_eq!(parse_input("/typing"), Ok(ChatInput::ToggleTyping));
        assert_eq!(parse_input("/read 42"), Ok(ChatInput::Read(42)));
        assert_eq!(
            parse_input("/reply 7 sounds good"),
            Ok(ChatInput::Reply {
                to: 7,
                content: "sounds good".into()
            })
        );
    }

    #[test]
    fn malformed_commands_explain_themselves() {
        assert!(parse_input("/read abc").is_err_and(|e| e.contains("abc")));
        assert!(parse_input("/reply 7").is_err_and(|e| e.contains("usage")));
        assert!(parse_input("/shrug").is_err_and(|e| e.contains("/shrug")));
    }

    #[test]
    fn message_line_shows_sender_and_reply() {
        let event = RoomEvent {
            room_id: 3,
            event: serde_json::from_value::<ChatMessage>(json!({
                "message_id": 12,
                "content": "hi",
                "sender_id": 2,
                "sender_username": "grace",
                "reply_to": 10
            }))
            .expect("valid message"),
        };
        assert_eq!(format_message(&event, false), "#12 grace (reply to #10): hi");
    }

    #[test]
    fn presence_line() {
        let event = RoomEvent {
            room_id: 3,
            event: serde_json::from_value::<PresenceStatus>(json!({
                "user_id": 2,
                "username": "grace",
                "status": "offline"
            }))
            .expect("valid presence"),
        };
        assert_eq!(format_presence(&event), "grace left the room");
    }
}
