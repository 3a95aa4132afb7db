use crate::models::message::Message;

/// Approximate token count: the number of whitespace-separated words.
///
/// This deliberately undercounts compared to a real tokenizer. Budgets that
/// use it are sized with that in mind.
pub fn estimate_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

pub fn count_message_tokens(messages: &[Message]) -> usize {
    messages
        .iter()
        .map(|message| estimate_tokens(&message.content))
        .sum()
}

/// Cut `text` after its first `cap` words, keeping the original spacing of
/// what remains. Text already within the cap is returned unchanged.
pub fn truncate_to_tokens(text: &str, cap: usize) -> &str {
    let mut words = 0;
    let mut in_word = false;
    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            in_word = false;
        } else if !in_word {
            if words == cap {
                return text[..idx].trim_end();
            }
            words += 1;
            in_word = true;
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens_counts_words() {
        assert_eq!(estimate_tokens("Hey there!"), 2);
        assert_eq!(estimate_tokens("  spaced\n\tout   words "), 3);
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn test_count_message_tokens_sums_contents() {
        let messages = vec![
            Message::system("you are helpful"),
            Message::user("why is my stream buffering"),
        ];
        assert_eq!(count_message_tokens(&messages), 8);
    }

    #[test]
    fn test_truncate_to_tokens() {
        assert_eq!(truncate_to_tokens("one two  three\nfour", 3), "one two  three");
        assert_eq!(truncate_to_tokens("one two", 5), "one two");
        assert_eq!(truncate_to_tokens("one two", 0), "");
        assert_eq!(truncate_to_tokens("naïve café au lait", 2), "naïve café");
    }
}
