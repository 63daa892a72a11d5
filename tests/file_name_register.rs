//! Naming contracts of the file name registry.

use gitnotes::model::Note;
use gitnotes::sync::{FileNameRegister, WorkingTree};
use tempfile::TempDir;

fn note(id: &str, content: &str) -> Note {
    Note::with_timestamps(id, content, 100, 100)
}

/// Name a note and perform the I/O a sync cycle would.
fn write_note(register: &mut FileNameRegister, note: &Note) -> String {
    let assignment = register.file_for(note).unwrap();
    if let Some(previous) = &assignment.previous {
        previous.delete(false).unwrap();
    }
    assignment.file.write(&note.content).unwrap();
    assignment.file.relative_path().to_string()
}

fn open(temp: &TempDir) -> FileNameRegister {
    let tree = WorkingTree::new(temp.path().join("repo"));
    FileNameRegister::open(&temp.path().join("file_records.json"), tree).unwrap()
}

#[test]
fn heading_edit_renames_and_second_note_takes_suffix() {
    let temp = TempDir::new().unwrap();
    let mut register = open(&temp);
    let root = temp.path().join("repo");

    let mut first = note("n1", "# abc");
    assert_eq!(write_note(&mut register, &first), "abc.md");

    let second = note("n2", "# abc");
    assert_eq!(write_note(&mut register, &second), "abc_2.md");

    first.content = "# abc def".to_string();
    assert_eq!(write_note(&mut register, &first), "abc_def.md");
    assert!(!root.join("abc.md").exists());
    assert!(root.join("abc_def.md").exists());
    assert_eq!(register.note_id_for("abc.md"), None);
    assert_eq!(register.note_id_for("abc_def.md"), Some("n1"));
    assert_eq!(register.note_id_for("abc_2.md"), Some("n2"));
}

#[test]
fn same_heading_is_suffixed_in_naming_order() {
    let temp = TempDir::new().unwrap();
    let mut register = open(&temp);

    let names: Vec<String> = (1..=4)
        .map(|i| write_note(&mut register, &note(&format!("n{i}"), "# Groceries")))
        .collect();

    assert_eq!(
        names,
        vec!["groceries.md", "groceries_2.md", "groceries_3.md", "groceries_4.md"]
    );
}

#[test]
fn suffix_follows_highest_existing_suffix() {
    let temp = TempDir::new().unwrap();
    let mut register = open(&temp);

    write_note(&mut register, &note("n1", "# todo"));
    register.register("todo_7.md", "n7").unwrap();

    assert_eq!(write_note(&mut register, &note("n2", "# todo")), "todo_8.md");
}

#[test]
fn archive_toggle_moves_between_root_and_archive() {
    let temp = TempDir::new().unwrap();
    let mut register = open(&temp);
    let root = temp.path().join("repo");

    let mut plan = note("n1", "# Plan");
    assert_eq!(write_note(&mut register, &plan), "plan.md");

    plan.archived_at = Some(200);
    assert_eq!(write_note(&mut register, &plan), "archived/plan.md");
    assert!(!root.join("plan.md").exists());

    plan.archived_at = None;
    assert_eq!(write_note(&mut register, &plan), "plan.md");
    assert!(!root.join("archived/plan.md").exists());

    plan.archived_at = Some(300);
    assert_eq!(write_note(&mut register, &plan), "archived/plan.md");
    assert!(!root.join("plan.md").exists());
}

#[test]
fn unarchive_collides_when_root_name_was_taken() {
    let temp = TempDir::new().unwrap();
    let mut register = open(&temp);
    let root = temp.path().join("repo");

    let mut old = note("n1", "# Plan");
    old.archived_at = Some(100);
    assert_eq!(write_note(&mut register, &old), "archived/plan.md");

    let newer = note("n2", "# Plan");
    assert_eq!(write_note(&mut register, &newer), "plan.md");

    old.archived_at = None;
    assert_eq!(write_note(&mut register, &old), "plan_2.md");
    assert!(!root.join("archived/plan.md").exists());
    assert_eq!(register.note_id_for("plan.md"), Some("n2"));
}

#[test]
fn unregistered_file_with_other_content_is_not_overwritten() {
    let temp = TempDir::new().unwrap();
    let mut register = open(&temp);
    let root = temp.path().join("repo");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join("ideas.md"), "# Ideas\nhand written").unwrap();

    assert_eq!(write_note(&mut register, &note("n1", "# Ideas")), "ideas_2.md");
    assert_eq!(
        std::fs::read_to_string(root.join("ideas.md")).unwrap(),
        "# Ideas\nhand written"
    );
}

#[test]
fn empty_heading_uses_default_slug() {
    let temp = TempDir::new().unwrap();
    let mut register = open(&temp);

    assert_eq!(write_note(&mut register, &note("n1", "")), "untitled.md");
    assert_eq!(write_note(&mut register, &note("n2", "#  \n")), "untitled_2.md");
}

#[test]
fn prune_is_idempotent_and_keeps_latest() {
    let temp = TempDir::new().unwrap();
    let mut register = open(&temp);
    let keep = note("n1", "# Keep");
    let drop = note("n2", "# Drop");
    write_note(&mut register, &keep);
    write_note(&mut register, &drop);

    let latest = vec![keep.clone()];
    assert_eq!(register.prune_stale_records(&latest).unwrap(), 1);
    let after_once = register.records();
    assert_eq!(register.prune_stale_records(&latest).unwrap(), 0);
    assert_eq!(register.records(), after_once);
    assert_eq!(register.file_name_for("n1"), Some("keep.md"));
    assert_eq!(register.file_name_for("n2"), None);
}

#[test]
fn records_survive_reopen() {
    let temp = TempDir::new().unwrap();
    {
        let mut register = open(&temp);
        write_note(&mut register, &note("n1", "# Travel"));
    }

    let register = open(&temp);
    assert_eq!(register.note_id_for("travel.md"), Some("n1"));
}

#[test]
fn lost_registry_is_rebuilt_from_scan() {
    let temp = TempDir::new().unwrap();
    let notes = vec![note("n1", "# One"), note("n2", "# One")];
    {
        let mut register = open(&temp);
        for n in &notes {
            write_note(&mut register, n);
        }
    }
    std::fs::write(temp.path().join("file_records.json"), "{ broken").unwrap();

    let mut register = open(&temp);
    assert!(register.is_empty());
    assert_eq!(register.rebuild_from_scan(&notes).unwrap(), 2);
    assert_eq!(register.note_id_for("one.md"), Some("n1"));
    assert_eq!(register.note_id_for("one_2.md"), Some("n2"));
}

#[test]
fn heading_edit_to_base_of_suffixed_slug_renames() {
    let temp = TempDir::new().unwrap();
    let mut register = open(&temp);
    let root = temp.path().join("repo");

    let mut week = note("n1", "# Week 2");
    assert_eq!(write_note(&mut register, &week), "week_2.md");

    week.content = "# Week".to_string();
    let assignment = register.file_for(&week).unwrap();
    assert_eq!(assignment.file.relative_path(), "week.md");
    assert_eq!(
        assignment.previous.as_ref().map(|p| p.relative_path()),
        Some("week_2.md")
    );
    assignment.previous.unwrap().delete(false).unwrap();
    assignment.file.write(&week.content).unwrap();

    assert!(!root.join("week_2.md").exists());
    assert_eq!(register.note_id_for("week.md"), Some("n1"));
    assert_eq!(register.note_id_for("week_2.md"), None);
}

#[test]
fn assigned_slug_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let mut week = note("n1", "# Week 2");
    {
        let mut register = open(&temp);
        write_note(&mut register, &week);
    }

    let mut register = open(&temp);
    assert_eq!(register.records()[0].slug.as_deref(), Some("week_2"));
    week.content = "# Week\nafter reopen".to_string();
    assert_eq!(write_note(&mut register, &week), "week.md");
}

#[test]
fn registered_collision_name_is_released_once_base_is_free() {
    let temp = TempDir::new().unwrap();
    let mut register = open(&temp);
    let root = temp.path().join("repo");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join("week_2.md"), "# Week").unwrap();
    register.register("week_2.md", "n1").unwrap();

    assert_eq!(write_note(&mut register, &note("n1", "# Week")), "week.md");
}

#[test]
fn registered_collision_name_is_kept_while_base_is_owned() {
    let temp = TempDir::new().unwrap();
    let mut register = open(&temp);
    write_note(&mut register, &note("n1", "# Week"));
    register.register("week_2.md", "n2").unwrap();

    let assignment = register.file_for(&note("n2", "# Week\nbody")).unwrap();
    assert_eq!(assignment.file.relative_path(), "week_2.md");
    assert!(assignment.previous.is_none());
}
