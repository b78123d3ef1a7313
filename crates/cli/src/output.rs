//! Console rendering.

use pizzeria_chat::Notice;
use pizzeria_chat::models::{Conversation, Message, Selection};
use pizzeria_core::{Delivery, SenderType};

/// Print a numbered conversation list.
#[allow(clippy::print_stdout)]
pub fn conversations(conversations: &[Conversation]) {
    if conversations.is_empty() {
        println!("No conversations.");
        return;
    }
    for (index, conversation) in conversations.iter().enumerate() {
        let last = conversation.last_message.as_deref().unwrap_or("-");
        let at = conversation
            .last_message_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "{:>3}. [{}] {} (user {}, order {}) {} {}",
            index + 1,
            conversation.status,
            conversation.name,
            conversation.user_id,
            conversation.order_id,
            at,
            last,
        );
    }
}

/// Print a full transcript.
#[allow(clippy::print_stdout)]
pub fn transcript(messages: &[Message]) {
    if messages.is_empty() {
        println!("(no messages)");
        return;
    }
    for message in messages {
        self::message(message);
    }
}

/// Print one transcript line.
#[allow(clippy::print_stdout)]
pub fn message(message: &Message) {
    let who = match message.sender_type {
        Some(SenderType::User) => "customer",
        Some(SenderType::Admin) => "operator",
        None => "admin",
    };
    let delivery = match message.delivery {
        Delivery::Pending => " (sending)",
        Delivery::Failed => " (not delivered)",
        Delivery::Sent => "",
    };
    println!(
        "[{}] {} {}: {}{}",
        message.created_at.format("%H:%M"),
        who,
        message.sender_id,
        message.content,
        delivery,
    );
}

/// Print the selected conversation header.
#[allow(clippy::print_stdout)]
pub fn selection(selection: &Selection) {
    println!(
        "== {} (user {}, order {}, {}) ==",
        selection.name, selection.user_id, selection.order_id, selection.status
    );
}

/// Print a user-visible notice.
#[allow(clippy::print_stdout)]
pub fn notice(notice: &Notice) {
    println!("! {notice}");
}

/// Print a plain line.
#[allow(clippy::print_stdout)]
pub fn line(text: &str) {
    println!("{text}");
}
