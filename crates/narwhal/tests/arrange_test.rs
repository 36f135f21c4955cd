use narwhal::{
    ArrangeOptions, Arrangement, Axis, CancelToken, Constraint, Error, Graph, Vec2, arrange,
};

const NODE: f64 = 30.0;

fn chain(n: usize) -> Graph {
    let mut g = Graph::new();
    let mut prev = None;
    for _ in 0..n {
        let id = g.add_node(NODE, NODE);
        if let Some(p) = prev {
            g.add_edge(p, id);
        }
        prev = Some(id);
    }
    g
}

fn distance(g: &Graph, a: usize, b: usize) -> f64 {
    (g.nodes[a].position - g.nodes[b].position).length()
}

#[test]
fn empty_graph_arranges_without_error() {
    let mut g = Graph::new();
    let stats = arrange(&mut g, &[], &ArrangeOptions::default()).unwrap();
    assert_eq!(stats.iterations, 0);
}

#[test]
fn single_node_keeps_a_finite_position() {
    let mut g = chain(1);
    g.nodes[0].position = Vec2::new(7.0, -3.0);
    arrange(&mut g, &[], &ArrangeOptions::default()).unwrap();
    assert!(g.nodes[0].position.is_finite());
}

#[test]
fn two_connected_nodes_settle_near_the_ideal_length() {
    let mut g = chain(2);
    let options = ArrangeOptions::default();
    arrange(&mut g, &[], &options).unwrap();
    let d = distance(&g, 0, 1);
    assert!(d.is_finite());
    assert!(
        (d - options.ideal_edge_length).abs() < options.ideal_edge_length * 0.5,
        "distance {d} too far from ideal"
    );
}

#[test]
fn chain_with_a_fixed_anchor_converges_near_the_ideal_spacing() {
    let mut g = chain(3);
    g.nodes[0].fixed = true;
    g.nodes[0].position = Vec2::new(12.0, 34.0);
    let options = ArrangeOptions::default();
    let stats = arrange(&mut g, &[], &options).unwrap();
    assert!(stats.converged, "polish did not converge");
    assert_eq!(g.nodes[0].position, Vec2::new(12.0, 34.0));
    let tolerance = options.ideal_edge_length * 0.5;
    for (a, b) in [(0, 1), (1, 2)] {
        let d = distance(&g, a, b);
        assert!(
            (d - options.ideal_edge_length).abs() < tolerance,
            "distance {d} between {a} and {b} too far from ideal"
        );
    }
}

#[test]
fn disconnected_components_keep_separate_centroids() {
    let mut g = Graph::new();
    let a1 = g.add_node(NODE, NODE);
    let a2 = g.add_node(NODE, NODE);
    let b1 = g.add_node(NODE, NODE);
    let b2 = g.add_node(NODE, NODE);
    g.add_edge(a1, a2);
    g.add_edge(b1, b2);
    arrange(&mut g, &[], &ArrangeOptions::default()).unwrap();
    let centroid_a = (g.node(a1).position + g.node(a2).position) * 0.5;
    let centroid_b = (g.node(b1).position + g.node(b2).position) * 0.5;
    let radius_a = (g.node(a1).position - centroid_a).length() + g.node(a1).radius();
    let radius_b = (g.node(b1).position - centroid_b).length() + g.node(b1).radius();
    assert!(
        (centroid_a - centroid_b).length() > radius_a + radius_b,
        "components overlap"
    );
    for node in &g.nodes {
        assert!(node.position.is_finite());
    }
}

#[test]
fn arrangement_is_deterministic_for_a_fixed_seed() {
    let options = ArrangeOptions::default();
    let mut first = chain(12);
    let mut second = chain(12);
    arrange(&mut first, &[], &options).unwrap();
    arrange(&mut second, &[], &options).unwrap();
    for (a, b) in first.nodes.iter().zip(&second.nodes) {
        assert_eq!(a.position, b.position);
    }
}

#[test]
fn different_seeds_still_produce_finite_layouts() {
    for seed in [1, 2, 99, 0xDEAD_BEEF] {
        let mut g = chain(8);
        let options = ArrangeOptions {
            random_seed: seed,
            ..ArrangeOptions::default()
        };
        arrange(&mut g, &[], &options).unwrap();
        for node in &g.nodes {
            assert!(node.position.is_finite());
        }
    }
}

#[test]
fn alignment_groups_share_a_coordinate_after_arrange() {
    let mut g = chain(4);
    let constraints = [Constraint::Alignment {
        nodes: vec![g.nodes[1].id, g.nodes[3].id],
        axis: Axis::Horizontal,
    }];
    arrange(&mut g, &constraints, &ArrangeOptions::default()).unwrap();
    assert!(
        (g.nodes[1].position.y - g.nodes[3].position.y).abs() < 1e-9,
        "aligned nodes drifted apart"
    );
}

#[test]
fn relative_gaps_hold_after_enforce() {
    let mut g = chain(3);
    let constraints = [
        Constraint::Relative {
            first: g.nodes[0].id,
            second: g.nodes[1].id,
            axis: Axis::Horizontal,
            min_gap: 15.0,
        },
        Constraint::Relative {
            first: g.nodes[1].id,
            second: g.nodes[2].id,
            axis: Axis::Horizontal,
            min_gap: 15.0,
        },
    ];
    let options = ArrangeOptions::default();
    let mut arrangement = Arrangement::new(&constraints, &options, CancelToken::new()).unwrap();
    arrangement.spectral(&mut g).unwrap();
    arrangement.transform(&mut g).unwrap();
    arrangement.enforce(&mut g).unwrap();
    for (a, b) in [(0, 1), (1, 2)] {
        let border_gap = (g.nodes[b].position.x - g.nodes[b].half_width())
            - (g.nodes[a].position.x + g.nodes[a].half_width());
        assert!(border_gap >= 15.0 - 1e-9, "gap {border_gap} below minimum");
    }
}

#[test]
fn fixed_constraint_pins_a_node_through_the_whole_pipeline() {
    let mut g = chain(4);
    g.nodes[2].position = Vec2::new(-40.0, 25.0);
    let constraints = [Constraint::Fixed(g.nodes[2].id)];
    arrange(&mut g, &constraints, &ArrangeOptions::default()).unwrap();
    assert_eq!(g.nodes[2].position, Vec2::new(-40.0, 25.0));
}

#[test]
fn cancelled_token_aborts_the_pipeline() {
    let mut g = chain(6);
    let options = ArrangeOptions::default();
    let token = CancelToken::new();
    token.cancel();
    let mut arrangement = Arrangement::new(&[], &options, token).unwrap();
    assert!(matches!(arrangement.run(&mut g), Err(Error::Cancelled)));
}

#[test]
fn cooling_factor_outside_the_unit_interval_is_rejected() {
    let mut g = chain(2);
    let options = ArrangeOptions {
        cooling_factor: 1.0,
        ..ArrangeOptions::default()
    };
    assert!(matches!(
        arrange(&mut g, &[], &options),
        Err(Error::InvalidOptions { .. })
    ));
}

#[test]
fn dangling_edge_is_rejected_before_any_phase_runs() {
    let mut g = chain(2);
    let ghost = narwhal::NodeId(99);
    g.add_edge(g.nodes[0].id, ghost);
    assert!(matches!(
        arrange(&mut g, &[], &ArrangeOptions::default()),
        Err(Error::MissingEndpoint { edge: 1 })
    ));
}

#[test]
fn compound_bounds_wrap_children_after_arrange() {
    let mut g = Graph::new();
    let parent = g.add_node(0.0, 0.0);
    let c1 = g.add_child(parent, NODE, NODE);
    let c2 = g.add_child(parent, NODE, NODE);
    let outside = g.add_node(NODE, NODE);
    g.add_edge(c1, c2);
    g.add_edge(c2, outside);
    arrange(&mut g, &[], &ArrangeOptions::default()).unwrap();
    let parent_rect = g.node(parent).rect();
    for child in [c1, c2] {
        let rect = g.node(child).rect();
        assert!(rect.min_x >= parent_rect.min_x - 1e-9);
        assert!(rect.min_y >= parent_rect.min_y - 1e-9);
        assert!(rect.max_x <= parent_rect.max_x + 1e-9);
        assert!(rect.max_y <= parent_rect.max_y + 1e-9);
    }
}

#[test]
fn spectral_draft_spacing_tracks_the_ideal_edge_length() {
    let mut g = chain(3);
    let options = ArrangeOptions::default();
    let mut arrangement = Arrangement::new(&[], &options, CancelToken::new()).unwrap();
    arrangement.spectral(&mut g).unwrap();
    for (a, b) in [(0, 1), (1, 2)] {
        let d = distance(&g, a, b);
        assert!(
            (d - options.ideal_edge_length).abs() < options.ideal_edge_length * 0.25,
            "draft distance {d} far from ideal"
        );
    }
}

#[test]
fn spectral_draft_spreads_a_small_cluster() {
    let mut g = chain(5);
    let options = ArrangeOptions::default();
    let mut arrangement = Arrangement::new(&[], &options, CancelToken::new()).unwrap();
    arrangement.spectral(&mut g).unwrap();
    let mut min_gap = f64::INFINITY;
    for i in 0..5 {
        for j in (i + 1)..5 {
            min_gap = min_gap.min(distance(&g, i, j));
        }
    }
    assert!(min_gap > 1.0, "draft left nodes on top of each other");
    for node in &g.nodes {
        assert!(node.position.is_finite());
    }
}
