mod common;

use cachenet_core::internal::*;
use cachenet_core::model::weights;
use cachenet_core::ops::cnn::Convolution;
use common::*;

fn conv_params(num_output: i32, weights: i32) -> ParamDict {
    let mut pd = ParamDict::default();
    pd.set(0, num_output).set(1, 3).set(4, 1).set(6, weights);
    pd
}

/// data -> a -> b, two single channel 3x3 convolutions
fn chain() -> GraphDesc {
    let mut desc = GraphDesc::default();
    desc.input("data", 1, 4, 4)
        .layer(LayerType::Convolution, "a", &["data"], &["a"], &conv_params(1, 9))
        .layer(LayerType::Convolution, "b", &["a"], &["b"], &conv_params(1, 9));
    desc
}

fn kernel() -> Vec<f32> {
    (0..9).map(|i| (i as f32 - 4.0) * 0.25).collect()
}

fn loaded(graph: &Graph, node: usize) -> usize {
    graph.nodes[node].layer_as::<Convolution>().unwrap().weights.len()
}

#[test]
fn loading_stops_at_the_first_short_layer() {
    setup_test_logger();
    let mut graph = chain().text_graph();
    let err = graph.load_model(&*weights_for(&[(kernel(), vec![])])).unwrap_err();
    assert!(format!("{err:?}").contains("\"b\""));
    assert_eq!(loaded(&graph, 1), 9);
    assert_eq!(loaded(&graph, 2), 0);
}

#[derive(Debug, Clone, Default)]
struct Broken;

impl Layer for Broken {
    fn name(&self) -> Cow<str> {
        "Broken".into()
    }

    fn load_model(&mut self, _mb: &mut dyn ModelBin) -> CnResult<()> {
        bail!("corrupted")
    }

    fn one_blob_only(&self) -> bool {
        true
    }

    fn forward_one(&self, input: TValue) -> CnResult<TValue> {
        Ok(input)
    }
}

#[test]
fn a_failing_layer_stops_the_following_ones() {
    let mut graph = Graph::default();
    let index = graph.register_custom_layer("Broken", || Box::new(Broken) as Box<dyn Layer>).unwrap();
    let mut desc = GraphDesc::default();
    desc.input("data", 1, 4, 4)
        .layer(LayerType::Convolution, "a", &["data"], &["a"], &conv_params(1, 9))
        .custom("Broken", index, "broken", &["a"], &["x"], &ParamDict::default())
        .layer(LayerType::Convolution, "c", &["x"], &["c"], &conv_params(1, 9));
    graph.load_param_text(desc.to_text().as_bytes()).unwrap();
    let err = graph.load_model(&*weights_for(&[(kernel(), vec![]), (kernel(), vec![])])).unwrap_err();
    assert!(format!("{err:?}").contains("corrupted"));
    assert_eq!(loaded(&graph, 1), 9);
    assert_eq!(loaded(&graph, 3), 0);
}

#[test]
fn half_precision_weights() {
    let desc = chain();
    let mut full = desc.text_graph();
    full.load_model(&*weights_for(&[(kernel(), vec![]), (kernel(), vec![])])).unwrap();

    let mut buf = vec![];
    weights::write::f16_record(&mut buf, &kernel()).unwrap();
    weights::write::f32_record(&mut buf, &kernel()).unwrap();
    let mut half = desc.text_graph();
    half.load_model(&*buf).unwrap();

    let input = ramp3(1, 4, 4, 0.5);
    let run = |graph: &Graph| {
        let mut ex = graph.extractor();
        ex.input(0, input.clone()).unwrap();
        ex.extract_by_name("b").unwrap().into_tensor()
    };
    run(&half).close_enough(&run(&full), 1e-6).unwrap();
}

#[test]
fn unknown_record_tags_are_rejected() {
    let mut buf = vec![];
    buf.extend(0x1234u32.to_le_bytes());
    buf.extend(weights_for(&[(kernel(), vec![])]).into_iter().skip(4));
    let mut graph = chain().text_graph();
    let err = graph.load_model(&*buf).unwrap_err();
    assert!(format!("{err:?}").contains("tag"));
    assert_eq!(loaded(&graph, 1), 0);
}

#[test]
fn in_memory_weights() {
    let mut bytes = weights_for(&[(kernel(), vec![]), (kernel(), vec![])]);
    let len = bytes.len();
    bytes.extend([0u8; 12]);
    let mut graph = chain().text_graph();
    let aligned = Placed::new(&bytes, 0);
    assert_eq!(graph.load_model_mem(aligned.bytes()).unwrap(), len);

    let mut graph = chain().text_graph();
    let unaligned = Placed::new(&bytes, 3);
    assert!(graph.load_model_mem(unaligned.bytes()).is_err());
    assert_eq!(loaded(&graph, 1), 0);
}
