//! `mapper <dumpfile>` — walk the dungeon graph embedded in a memory dump
//! and emit Graphviz `dot` output.
//!
//! Grounded in `original_source/code/src/mapper/main.cpp`: each room is a
//! 4-word record `{ title_ref, description_ref, exits_ref, links_ref }`;
//! `exits_ref` points to a length-prefixed list of exit-name string
//! references, `links_ref` to a length-prefixed list of room offsets. The
//! three starting offsets are specific to the known challenge image (per
//! spec.md, non-core data-shape knowledge), named here rather than baked
//! into the traversal.

use std::collections::{HashSet, VecDeque};
use std::process::ExitCode;

use synacor_vm::loader::load_image;
use synacor_vm::types::Word;

/// Known room offsets to seed the breadth-first walk from: foothills,
/// headquarters, beach/vault.
const ENTRY_POINTS: &[Word] = &[0x090D, 0x09B8, 0x09C2];

fn read_string(image: &[Word], offset: usize) -> String {
    let len = image.get(offset).copied().unwrap_or(0) as usize;
    image[offset + 1..]
        .iter()
        .take(len)
        .map(|&w| (w & 0xFF) as u8 as char)
        .collect()
}

struct Room {
    offset: Word,
}

impl Room {
    fn id(&self) -> String {
        format!("{:04x}", self.offset)
    }

    fn title(image: &[Word], offset: Word) -> String {
        let title_ref = image.get(offset as usize).copied().unwrap_or(0);
        read_string(image, title_ref as usize)
    }

    fn exits(image: &[Word], offset: Word) -> Vec<String> {
        let exits_ref = image.get(offset as usize + 2).copied().unwrap_or(0) as usize;
        let n = image.get(exits_ref).copied().unwrap_or(0) as usize;
        (0..n)
            .map(|i| {
                let name_ref = image.get(exits_ref + 1 + i).copied().unwrap_or(0);
                read_string(image, name_ref as usize)
            })
            .collect()
    }

    fn links(image: &[Word], offset: Word) -> Vec<Room> {
        let links_ref = image.get(offset as usize + 3).copied().unwrap_or(0) as usize;
        let n = image.get(links_ref).copied().unwrap_or(0) as usize;
        (0..n)
            .map(|i| Room {
                offset: image.get(links_ref + 1 + i).copied().unwrap_or(0),
            })
            .collect()
    }
}

fn walk_dungeon(out: &mut String, image: &[Word], start: Word) {
    let mut fringe = VecDeque::new();
    let mut visited = HashSet::new();
    fringe.push_back(Room { offset: start });

    while let Some(room) = fringe.pop_front() {
        if !visited.insert(room.offset) {
            continue;
        }

        let title = Room::title(image, room.offset);
        out.push_str(&format!("\"{}\" [label=\"{}\"]\n", room.id(), title));

        let exits = Room::exits(image, room.offset);
        for (i, link) in Room::links(image, room.offset).into_iter().enumerate() {
            let exit_name = exits.get(i).map(String::as_str).unwrap_or("");
            out.push_str(&format!("\"{}\" -> \"{}\" [label=\"{exit_name}\"]\n", room.id(), link.id()));
            if !visited.contains(&link.offset) {
                fringe.push_back(link);
            }
        }
    }
}

fn emit_graphviz(image: &[Word], entries: &[Word]) -> String {
    let mut out = String::new();
    out.push_str("digraph \"Synacore\" {\n");
    for &entry in entries {
        walk_dungeon(&mut out, image, entry);
    }
    out.push_str("}\n");
    out
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args();
    let _argv0 = args.next();

    let Some(path) = args.next() else {
        println!("usage: mapper <dumpfile>");
        return ExitCode::SUCCESS;
    };

    let image = match load_image(&path) {
        Ok(image) => image,
        Err(e) => {
            tracing::error!(error = %e, path, "failed to read dump");
            println!("usage: mapper <dumpfile>");
            return ExitCode::SUCCESS;
        }
    };

    print!("{}", emit_graphviz(&image, ENTRY_POINTS));

    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_a_two_room_graph() {
        // Room A at 0, Room B at 20.
        let mut image = vec![0u16; 64];

        // Strings: "A" at 40, "north" at 50, "B" at 60.
        image[40] = 1;
        image[41] = b'A' as Word;
        image[50] = 5;
        for (i, c) in "north".bytes().enumerate() {
            image[51 + i] = c as Word;
        }
        image[60] = 1;
        image[61] = b'B' as Word;

        // Room A: title=40, desc=0, exits=30, links=35
        image[0] = 40;
        image[1] = 0;
        image[2] = 30;
        image[3] = 35;
        image[30] = 1; // one exit
        image[31] = 50; // "north"
        image[35] = 1; // one link
        image[36] = 20; // room B offset

        // Room B: title=60, desc=0, exits=0 (no exits), links=0 (no links)
        image[20] = 60;
        image[21] = 0;
        image[22] = 0;
        image[23] = 0;

        let out = emit_graphviz(&image, &[0]);
        assert!(out.contains("\"0000\" [label=\"A\"]"));
        assert!(out.contains("\"0014\" [label=\"B\"]"));
        assert!(out.contains("\"0000\" -> \"0014\" [label=\"north\"]"));
    }
}
