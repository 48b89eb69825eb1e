use std::collections::BTreeSet;
use std::sync::Arc;

use adminsh::command::{Arity, Command, CommandRegistry, Help, ReplyBuffer, ReplySink};
use adminsh::servers::MemoryServers;
use adminsh::shell::{Outcome, Shell, parse_words};
use proptest::prelude::*;

fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
        .block_on(fut)
}

fn shell_with(registry: CommandRegistry) -> Shell {
    Shell::new(Arc::new(registry), Arc::new(MemoryServers::new()))
}

proptest! {
    #[test]
    fn test_parse_words_has_no_empty_or_padded_words(line in "[ \\ta-z0-9\\r]{0,64}") {
        let words = parse_words(&line);
        for word in &words {
            prop_assert!(!word.is_empty());
            prop_assert!(!word.contains(char::is_whitespace));
        }
        prop_assert_eq!(words.join(""), line.split_whitespace().collect::<String>());
    }

    #[test]
    fn test_whitespace_only_lines_dispatch_nothing(line in "[ \\t\\r]{0,32}") {
        let shell = shell_with(CommandRegistry::with_builtins());
        let outcome = block_on(shell.dispatch(&line));
        prop_assert!(matches!(outcome, Outcome::Empty));
    }

    #[test]
    fn test_chunked_flush_matches_plain_write(text in "\\PC{0,300}") {
        let mut reply = ReplyBuffer::new();
        reply.write_str(&text);

        let mut out: Vec<u8> = Vec::new();
        block_on(reply.flush_to(&mut out)).expect("flush");
        prop_assert_eq!(out, text.as_bytes().to_vec());
    }

    #[test]
    fn test_help_lists_every_command_once_in_order(
        names in prop::collection::btree_set("[a-z]{1,8}", 1..12)
    ) {
        let names: Vec<String> = names
            .into_iter()
            .filter(|n| n != "exit" && n != "quit" && n != "help")
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut registry = CommandRegistry::new();
        registry
            .register(Command::new("help", Arity::Range { min: 1, max: 2 }, "[cmd]", "Shows help", Help))
            .expect("register help");
        // Reverse order so registration order differs from sorted order.
        for name in names.iter().rev() {
            registry
                .register(Command::from_fn(name.as_str(), Arity::Exact(1), "", "noop", |_, _| Ok(())))
                .expect("register");
        }

        let shell = shell_with(registry.clone());
        let Outcome::Reply(reply) = block_on(shell.dispatch("help")) else {
            return Err(TestCaseError::fail("help failed"));
        };
        let text = reply.to_string();

        let mut last = 0;
        for name in registry.names() {
            let needle = format!("\r\n {name} ");
            prop_assert_eq!(text.matches(&needle).count(), 1);
            let pos = text.find(&needle).unwrap_or_default();
            prop_assert!(pos >= last);
            last = pos;
        }
    }
}
