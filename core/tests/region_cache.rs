mod common;

use cachenet_core::internal::*;
use common::*;

/// data -> conv(3x3, pad 1) -> relu -> conv(3x3, dilation 2, pad 2) -> max pool 2x2
fn graph() -> Graph {
    let mut c1 = ParamDict::default();
    c1.set(0, 3).set(1, 3).set(4, 1).set(5, 1).set(6, 54);
    let mut c2 = ParamDict::default();
    c2.set(0, 2).set(1, 3).set(2, 2).set(4, 2).set(5, 1).set(6, 54);
    let mut pool = ParamDict::default();
    pool.set(0, 0).set(1, 2).set(2, 2);
    let mut desc = GraphDesc::default();
    desc.input("data", 2, 8, 8)
        .layer(LayerType::Convolution, "c1", &["data"], &["c1"], &c1)
        .layer(LayerType::ReLU, "relu", &["c1"], &["r"], &ParamDict::default())
        .layer(LayerType::Convolution, "c2", &["r"], &["c2"], &c2)
        .layer(LayerType::Pooling, "pool", &["c2"], &["out"], &pool);
    let mut graph = desc.text_graph();
    let w1: Vec<f32> = (0..54).map(|i| ((i * 5 % 13) as f32 - 6.0) * 0.125).collect();
    let w2: Vec<f32> = (0..54).map(|i| ((i * 3 % 7) as f32 - 3.0) * 0.25).collect();
    graph
        .load_model(&*weights_for(&[(w1, vec![0.5, 0.0, -0.5]), (w2, vec![1.0, -1.0])]))
        .unwrap();
    graph
}

fn frame(offset: f32) -> Tensor {
    let mut t = ramp3(2, 8, 8, 0.0625);
    t.as_slice_mut().iter_mut().for_each(|x| *x -= offset);
    t
}

fn touch(frame: &Tensor, rect: Rect) -> Tensor {
    let mut t = frame.clone();
    let (h, w) = t.plane();
    for (ix, x) in t.as_slice_mut().iter_mut().enumerate() {
        let (y, xx) = ((ix / w) % h, ix % w);
        if rect.contains(y as isize, xx as isize) {
            *x = -*x + 0.75;
        }
    }
    t
}

fn reference(graph: &Graph, frame: &Tensor) -> Tensor {
    let mut ex = graph.extractor();
    ex.input(0, frame.clone()).unwrap();
    ex.extract_by_name("out").unwrap().into_tensor()
}

#[test]
fn successive_rounds_match_full_recomputation() {
    setup_test_logger();
    let graph = graph();
    for light_mode in [false, true] {
        let mut ex = graph.extractor();
        ex.set_cache_mode(true);
        ex.set_light_mode(light_mode);

        let first = frame(2.0);
        ex.input(0, first.clone()).unwrap();
        let out = ex.extract_by_name("out").unwrap().into_tensor();
        assert_eq!(out, reference(&graph, &first));
        ex.update_cache();
        assert!(ex.cached(1).is_some());
        assert!(ex.cached(3).is_some());

        // same input, declared unchanged
        ex.clear_blob_data();
        ex.input(0, first.clone()).unwrap();
        ex.input_region(0, Region::unchanged()).unwrap();
        let previous = ex.cached(3).cloned().unwrap();
        assert_eq!(ex.extract_by_name("out").unwrap().into_tensor(), out);
        assert!(ex.region(3).unwrap().is_unchanged());
        if !light_mode {
            let c2 = ex.extract_by_name("c2").unwrap();
            assert!(TValue::ptr_eq(&c2, &previous));
        }
        ex.update_cache();

        // a patch of the input changed
        let changed = Rect::new(2, 5, 4, 7);
        let second = touch(&first, changed);
        ex.clear_blob_data();
        ex.input(0, second.clone()).unwrap();
        ex.input_region(0, Region::rect(changed)).unwrap();
        assert_eq!(ex.extract_by_name("out").unwrap().into_tensor(), reference(&graph, &second));
        let c1_region = ex.region(1).unwrap();
        assert!(!c1_region.is_full() && !c1_region.is_unchanged());
        ex.update_cache();

        // several patches at once
        let third = touch(&touch(&second, Rect::new(0, 0, 1, 2)), Rect::new(6, 6, 8, 8));
        ex.clear_blob_data();
        ex.input(0, third.clone()).unwrap();
        ex.input_region(0, Region::rect(Rect::new(0, 0, 1, 2)).with_rect(Rect::new(6, 6, 8, 8)))
            .unwrap();
        assert_eq!(ex.extract_by_name("out").unwrap().into_tensor(), reference(&graph, &third));
    }
}

#[test]
fn undeclared_regions_mean_full_recomputation() {
    let graph = graph();
    let mut ex = graph.extractor();
    ex.set_cache_mode(true);
    ex.input(0, frame(2.0)).unwrap();
    ex.extract_by_name("out").unwrap();
    ex.update_cache();

    let next = frame(1.0);
    ex.clear_blob_data();
    ex.input(0, next.clone()).unwrap();
    assert!(ex.region(0).unwrap().is_full());
    assert_eq!(ex.extract_by_name("out").unwrap().into_tensor(), reference(&graph, &next));
}

#[test]
fn cleared_cache_recomputes_everything() {
    let graph = graph();
    let mut ex = graph.extractor();
    ex.set_cache_mode(true);
    ex.input(0, frame(2.0)).unwrap();
    ex.extract_by_name("out").unwrap();
    ex.update_cache();
    ex.clear_cache();
    assert!(ex.cached(1).is_none());

    // even a wrong "unchanged" declaration can not surface stale values
    let next = frame(0.5);
    ex.clear_blob_data();
    ex.input(0, next.clone()).unwrap();
    ex.input_region(0, Region::unchanged()).unwrap();
    assert_eq!(ex.extract_by_name("out").unwrap().into_tensor(), reference(&graph, &next));
}

#[test]
fn layers_left_out_of_a_round_lose_their_cache() {
    let graph = graph();
    let mut ex = graph.extractor();
    ex.set_cache_mode(true);
    ex.input(0, frame(2.0)).unwrap();
    ex.extract_by_name("out").unwrap();
    ex.update_cache();

    ex.clear_blob_data();
    ex.input(0, frame(2.0)).unwrap();
    ex.extract_by_name("c1").unwrap();
    ex.update_cache();
    assert!(ex.cached(1).is_some());
    assert!(ex.cached(3).is_none());
}

/// Identity layer that can not tell how regions flow through it.
#[derive(Debug, Clone, Default)]
struct Opaque;

impl Layer for Opaque {
    fn name(&self) -> Cow<str> {
        "Opaque".into()
    }

    fn one_blob_only(&self) -> bool {
        true
    }

    fn forward_one(&self, input: TValue) -> CnResult<TValue> {
        Ok(input)
    }

    fn propagate_region(&self, _bottoms: &[Region], _top_count: usize) -> CnResult<TVec<Region>> {
        bail!("no idea")
    }
}

#[test]
fn failed_propagation_falls_back_to_full() {
    let mut graph = Graph::default();
    let index = graph.register_custom_layer("Opaque", || Box::new(Opaque) as Box<dyn Layer>).unwrap();
    let mut conv = ParamDict::default();
    conv.set(0, 1).set(1, 3).set(4, 1).set(6, 18);
    let mut desc = GraphDesc::default();
    desc.input("data", 2, 8, 8)
        .custom("Opaque", index, "opaque", &["data"], &["o"], &ParamDict::default())
        .layer(LayerType::Convolution, "conv", &["o"], &["out"], &conv);
    graph.load_param_text(desc.to_text().as_bytes()).unwrap();
    graph.load_model(&*weights_for(&[(vec![0.25; 18], vec![])])).unwrap();

    let mut ex = graph.extractor();
    ex.set_cache_mode(true);
    ex.input(0, frame(2.0)).unwrap();
    ex.extract_by_name("out").unwrap();
    ex.update_cache();

    let next = frame(1.0);
    ex.clear_blob_data();
    ex.input(0, next.clone()).unwrap();
    ex.input_region(0, Region::unchanged()).unwrap();
    let out = ex.extract_by_name("out").unwrap().into_tensor();
    assert!(ex.region(1).unwrap().is_full());
    let mut plain = graph.extractor();
    plain.input(0, next).unwrap();
    assert_eq!(out, plain.extract_by_name("out").unwrap().into_tensor());
}
