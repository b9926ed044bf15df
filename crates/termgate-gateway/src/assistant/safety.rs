//! Dangerous-command classifier.
//!
//! A pure predicate over command text matching a fixed list of high-risk
//! invocations. Matches annotate assistant output with a warning and cap
//! its confidence; they never block anything.

/// Commands whose bare invocation is high-risk regardless of arguments.
const DANGEROUS_COMMAND_WORDS: &[&str] = &["shutdown", "reboot", "halt", "poweroff", "fdisk", "killall"];

/// Returns whether the command matches the high-risk list.
pub fn is_dangerous(command: &str) -> bool {
    let normalized = command.trim().to_lowercase();
    if normalized.is_empty() {
        return false;
    }

    if has_recursive_root_removal(&normalized) {
        return true;
    }
    if normalized.contains("dd if=") {
        return true;
    }
    if normalized.contains("pkill -f") {
        return true;
    }
    if kills_init(&normalized) {
        return true;
    }
    if redirects_into_raw_device(&normalized) {
        return true;
    }

    command_words(&normalized).any(|word| {
        DANGEROUS_COMMAND_WORDS.contains(&word) || word.starts_with("mkfs")
    })
}

/// Positions in the pipeline where a token is a command word: the first
/// token and any token following a shell separator.
fn command_words(normalized: &str) -> impl Iterator<Item = &str> {
    let mut expect_command = true;
    normalized.split_whitespace().filter(move |token| {
        let is_separator = matches!(*token, "&&" | "||" | "|" | ";" | "sudo");
        let take = expect_command && !is_separator;
        expect_command = is_separator;
        take
    })
}

fn has_recursive_root_removal(normalized: &str) -> bool {
    let mut tokens = normalized.split_whitespace().peekable();
    while let Some(token) = tokens.next() {
        if token != "rm" {
            continue;
        }
        let mut recursive = false;
        let mut force = false;
        for arg in tokens.by_ref() {
            if arg.starts_with('-') {
                recursive |= arg.contains('r');
                force |= arg.contains('f');
                continue;
            }
            let root_target = arg == "/" || arg == "/*";
            if recursive && force && root_target {
                return true;
            }
            break;
        }
    }
    false
}

fn kills_init(normalized: &str) -> bool {
    let mut tokens = normalized.split_whitespace();
    while let Some(token) = tokens.next() {
        if token != "kill" {
            continue;
        }
        for arg in tokens.by_ref() {
            if arg.starts_with('-') {
                continue;
            }
            return arg == "1";
        }
    }
    false
}

fn redirects_into_raw_device(normalized: &str) -> bool {
    normalized.split('>').skip(1).any(|after| {
        let target = after.trim_start_matches('>').trim_start();
        target.starts_with("/dev/sd") || target.starts_with("/dev/hd")
    })
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn flags_every_listed_pattern() {
        let dangerous = [
            "rm -rf /",
            "rm -fr /*",
            "sudo rm -rf /",
            "dd if=/dev/zero of=/dev/sda",
            "mkfs.ext4 /dev/sda1",
            "mkfs /dev/sdb",
            "fdisk /dev/sda",
            "shutdown -h now",
            "reboot",
            "halt",
            "poweroff",
            "kill -9 1",
            "kill 1",
            "pkill -f python",
            "killall nginx",
            "echo garbage > /dev/sda",
            "cat image.iso >> /dev/hdb",
        ];
        for command in dangerous {
            assert!(is_dangerous(command), "should flag: {command}");
        }
    }

    #[test]
    fn no_false_positives_on_safe_commands() {
        let safe = [
            "ls -la",
            "cat /etc/os-release",
            "grep foo bar.txt",
            "rm -rf ./build",
            "rm notes.txt",
            "kill 4242",
            "pkill nginx",
            "echo reboot-plan.md",
            "tail -f /var/log/syslog",
            "dd of=backup.img",
            "echo hello > /tmp/out.txt",
        ];
        for command in safe {
            assert!(!is_dangerous(command), "false positive: {command}");
        }
    }

    #[test]
    fn classifier_is_deterministic() {
        for _ in 0..3 {
            assert!(is_dangerous("reboot"));
            assert!(!is_dangerous("ls -la"));
        }
    }

    #[test]
    fn empty_and_whitespace_are_safe() {
        assert!(!is_dangerous(""));
        assert!(!is_dangerous("   "));
    }

    #[test]
    fn dangerous_word_after_separator_is_flagged() {
        assert!(is_dangerous("apt update && reboot"));
        // the word as a plain argument is not a command position
        assert!(!is_dangerous("man reboot"));
    }
}
