/// Drops the echoed instruction block some instruct models put in front of
/// their answer (`<s>[INST] ... [/INST] answer`).
pub fn strip_instruction(s: &str) -> String {
    match s.split_once("[/INST]") {
        Some((_, answer)) => answer.trim().to_string(),
        None => s.trim().to_string(),
    }
}

pub fn paragraphs(text: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                result.push(collapse(&current.join(" ")));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        result.push(collapse(&current.join(" ")));
    }
    result
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_instruction() {
        assert_eq!(strip_instruction("<s>[INST] write [/INST]  Once upon "), "Once upon");
        assert_eq!(strip_instruction("  plain story "), "plain story");
    }

    #[test]
    fn test_paragraphs() {
        let text = "Twinkle, twinkle,\n   little star.\n\n\n  Up above\nthe world so high.\n";
        assert_eq!(
            paragraphs(text),
            vec![
                "Twinkle, twinkle, little star.".to_string(),
                "Up above the world so high.".to_string()
            ]
        );
        assert!(paragraphs("  \n \n").is_empty());
    }
}
