use super::*;
use crate::scene::{PreviewShape, Token};

fn vp() -> Viewport {
    Viewport::new(800.0, 600.0, 1.0)
}

fn doc_with_token(mut token: Token) -> SceneDoc {
    let mut doc = SceneDoc::default();
    token.id = 0;
    doc.add_token(token);
    doc
}

fn base_token() -> Token {
    Token {
        id: 0,
        name: "Ogre".to_string(),
        cell_x: 1.0,
        cell_y: 1.0,
        size: 1.0,
        color: "#b91c1c".to_string(),
        hp: Some(27),
        temp_hp: 0,
        armor_class: 12,
        hidden_from_viewers: false,
        name_hidden_from_viewers: false,
        censor_seed: Some("AB12CD".to_string()),
    }
}

fn labels(cmds: &[DrawCmd]) -> Vec<&str> {
    cmds.iter()
        .filter_map(|c| match c {
            DrawCmd::Label { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

fn has_text(cmds: &[DrawCmd], wanted: &str) -> bool {
    cmds.iter().any(|c| matches!(c, DrawCmd::Text { text, .. } if text == wanted))
}

#[test]
fn frame_starts_with_clear() {
    let doc = SceneDoc::default();
    let cmds = draw(&doc, &UiState::default(), &Overlays::default(), ViewRole::Operator, &vp(), 0);
    assert_eq!(cmds.first(), Some(&DrawCmd::Clear));
}

#[test]
fn display_list_round_trips_through_json() {
    let doc = doc_with_token(base_token());
    let cmds = draw(&doc, &UiState::default(), &Overlays::default(), ViewRole::Operator, &vp(), 0);
    let json = serde_json::to_value(&cmds).unwrap();
    assert_eq!(json[0]["op"], serde_json::json!("clear"));
    let back: Vec<DrawCmd> = serde_json::from_value(json).unwrap();
    assert_eq!(back, cmds);
}

#[test]
fn grid_toggles_with_the_setting() {
    let mut doc = SceneDoc::default();
    let lines = |doc: &SceneDoc| {
        draw(doc, &UiState::default(), &Overlays::default(), ViewRole::Operator, &vp(), 0)
            .iter()
            .filter(|c| matches!(c, DrawCmd::Line { .. }))
            .count()
    };
    assert!(lines(&doc) > 0);
    doc.grid.show = false;
    assert_eq!(lines(&doc), 0);
}

#[test]
fn preview_is_dashed_and_faint() {
    let doc = SceneDoc::default();
    let ui = UiState {
        preview: Some(PreviewShape {
            geom: crate::scene::ShapeGeom::Rect { x: 0.0, y: 0.0, w: -40.0, h: 20.0 },
            stroke: "#22c55e".to_string(),
            stroke_width: 3.0,
            fill: Some("#22c55e".to_string()),
        }),
        ..UiState::default()
    };
    let cmds = draw(&doc, &ui, &Overlays::default(), ViewRole::Operator, &vp(), 0);
    let rect = cmds
        .iter()
        .find(|c| matches!(c, DrawCmd::Rect { dash: Some(_), .. }))
        .expect("dashed preview rect");
    let DrawCmd::Rect { x, w, fill_opacity, .. } = rect else { unreachable!() };
    // Negative extents are normalized for drawing.
    assert!((x - -40.0).abs() < f64::EPSILON);
    assert!((w - 40.0).abs() < f64::EPSILON);
    assert!((fill_opacity - 0.12).abs() < f64::EPSILON);
}

#[test]
fn hp_label_is_operator_only() {
    let doc = doc_with_token(base_token());
    let op = draw(&doc, &UiState::default(), &Overlays::default(), ViewRole::Operator, &vp(), 0);
    assert!(has_text(&op, "27"));
    let viewer = draw(&doc, &UiState::default(), &Overlays::default(), ViewRole::Viewer, &vp(), 0);
    assert!(!has_text(&viewer, "27"));
}

#[test]
fn hidden_tokens_are_skipped_for_viewers() {
    let doc = doc_with_token(Token { hidden_from_viewers: true, ..base_token() });
    let viewer = draw(&doc, &UiState::default(), &Overlays::default(), ViewRole::Viewer, &vp(), 0);
    assert!(labels(&viewer).is_empty());
    let op = draw(&doc, &UiState::default(), &Overlays::default(), ViewRole::Operator, &vp(), 0);
    assert_eq!(labels(&op), vec!["Ogre"]);
}

#[test]
fn censored_names_roll_for_viewers_only() {
    let doc = doc_with_token(Token { name_hidden_from_viewers: true, ..base_token() });

    let op = draw(&doc, &UiState::default(), &Overlays::default(), ViewRole::Operator, &vp(), 0);
    assert_eq!(labels(&op), vec!["Ogre"]);

    let at = |now: i64| {
        let cmds = draw(&doc, &UiState::default(), &Overlays::default(), ViewRole::Viewer, &vp(), now);
        labels(&cmds)[0].to_string()
    };
    let a = at(0);
    assert_eq!(a.len(), 6);
    assert_ne!(a, "Ogre");
    // The code advances across ticks and is stable within one.
    assert_ne!(at(0), at(60));
    assert_eq!(at(0), at(59));
}

#[test]
fn global_hide_flag_censors_every_name() {
    let mut doc = doc_with_token(base_token());
    doc.player_view.hide_all_token_names = true;
    let viewer = draw(&doc, &UiState::default(), &Overlays::default(), ViewRole::Viewer, &vp(), 0);
    assert_ne!(labels(&viewer), vec!["Ogre"]);
    assert!(needs_animation(&doc, &Overlays::default(), ViewRole::Viewer, 0));
    assert!(!needs_animation(&doc, &Overlays::default(), ViewRole::Operator, 0));
}

#[test]
fn ping_lifetime_is_four_seconds() {
    let doc = SceneDoc::default();
    let ping = Ping {
        cell: Point::new(0.0, 0.0),
        ts: 10_000,
        label: "GM".to_string(),
        color: String::new(),
        kind: ViewRole::Operator,
    };
    let overlays = Overlays { ping: Some(ping) };

    // 1 s old: visible and animating.
    let cmds = draw(&doc, &UiState::default(), &overlays, ViewRole::Viewer, &vp(), 11_000);
    assert!(cmds.iter().any(|c| matches!(c, DrawCmd::Group { .. })));
    assert!(needs_animation(&doc, &overlays, ViewRole::Operator, 11_000));

    // 5 s old: nothing drawn, no longer animating.
    let cmds = draw(&doc, &UiState::default(), &overlays, ViewRole::Viewer, &vp(), 15_000);
    assert!(!cmds.iter().any(|c| matches!(c, DrawCmd::Group { .. })));
    assert!(!needs_animation(&doc, &overlays, ViewRole::Operator, 15_000));
}

#[test]
fn ping_fades_linearly() {
    let doc = SceneDoc::default();
    let ping = Ping {
        cell: Point::new(0.0, 0.0),
        ts: 0,
        label: String::new(),
        color: String::new(),
        kind: ViewRole::Viewer,
    };
    let overlays = Overlays { ping: Some(ping) };
    let opacity_at = |now: i64| {
        draw(&doc, &UiState::default(), &overlays, ViewRole::Viewer, &vp(), now)
            .iter()
            .find_map(|c| match c {
                DrawCmd::Group { opacity, .. } => Some(*opacity),
                _ => None,
            })
            .expect("ping group")
    };
    assert!(opacity_at(0) > opacity_at(2000));
    assert!((opacity_at(2000) - 0.5 * 0.95).abs() < 1e-9);
}

#[test]
fn operator_ping_is_dashed_viewer_ping_is_solid() {
    let doc = SceneDoc::default();
    let ring_dash = |kind: ViewRole| {
        let overlays = Overlays {
            ping: Some(Ping {
                cell: Point::new(0.0, 0.0),
                ts: 0,
                label: String::new(),
                color: String::new(),
                kind,
            }),
        };
        let cmds = draw(&doc, &UiState::default(), &overlays, ViewRole::Viewer, &vp(), 100);
        let DrawCmd::Group { cmds, .. } = cmds
            .iter()
            .find(|c| matches!(c, DrawCmd::Group { .. }))
            .expect("ping group")
        else {
            unreachable!()
        };
        let DrawCmd::Circle { dash, .. } = &cmds[0] else {
            panic!("ring first");
        };
        dash.is_some()
    };
    assert!(ring_dash(ViewRole::Operator));
    assert!(!ring_dash(ViewRole::Viewer));
}

#[test]
fn off_screen_ping_becomes_an_edge_bubble() {
    let doc = SceneDoc::default();
    // Far outside the 800x600 view around the origin.
    let overlays = Overlays {
        ping: Some(Ping {
            cell: Point::new(100.0, 0.0),
            ts: 0,
            label: "Alice".to_string(),
            color: String::new(),
            kind: ViewRole::Viewer,
        }),
    };
    let cmds = draw(&doc, &UiState::default(), &overlays, ViewRole::Viewer, &vp(), 100);
    let DrawCmd::Group { cmds, .. } = cmds
        .iter()
        .find(|c| matches!(c, DrawCmd::Group { .. }))
        .expect("ping group")
    else {
        unreachable!()
    };
    // Bubble, arrow, and label all live in screen space at the right edge.
    let DrawCmd::Circle { space, cx, .. } = &cmds[0] else {
        panic!("bubble first");
    };
    assert_eq!(*space, Space::Screen);
    assert!((cx - (800.0 - 18.0)).abs() < 1e-9);
    assert!(cmds.iter().any(|c| matches!(c, DrawCmd::Polygon { space: Space::Screen, .. })));
    assert!(cmds
        .iter()
        .any(|c| matches!(c, DrawCmd::Label { text, .. } if text == "Alice")));
}

#[test]
fn measure_overlay_draws_line_and_label() {
    let doc = SceneDoc::default();
    let ui = UiState {
        measure_mode: true,
        measure_start: Some(Point::new(0.0, 0.0)),
        measure_end: Some(Point::new(3.0, 4.0)),
        ..UiState::default()
    };
    let cmds = draw(&doc, &ui, &Overlays::default(), ViewRole::Operator, &vp(), 0);
    assert!(cmds
        .iter()
        .any(|c| matches!(c, DrawCmd::Line { stroke, .. } if stroke == "rgba(34,197,94,0.95)")));
    // Chebyshev distance 4 cells at 1 m/cell.
    assert!(labels(&cmds).contains(&"4.00 m"));
}
