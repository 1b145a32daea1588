mod common;

use std::io::Write;

use cachenet_core::internal::*;
use common::*;

fn desc() -> GraphDesc {
    let mut conv = ParamDict::default();
    conv.set(0, 3).set(1, 3).set(4, 1).set(5, 1).set(6, 54);
    let mut relu = ParamDict::default();
    relu.set(0, 0.1f32);
    let mut sum = ParamDict::default();
    sum.set(0, 1).set_array(1, [0.5f32, 2.0]);
    let mut pool = ParamDict::default();
    pool.set(0, 0).set(1, 2).set(2, 2);
    let mut desc = GraphDesc::default();
    desc.input("data", 2, 5, 5)
        .layer(LayerType::Convolution, "conv", &["data"], &["conv"], &conv)
        .layer(LayerType::ReLU, "relu", &["conv"], &["relu"], &relu)
        .layer(LayerType::Split, "split", &["relu"], &["s0", "s1", "s2"], &ParamDict::default())
        .layer(LayerType::AbsVal, "abs", &["s0"], &["abs"], &ParamDict::default())
        .layer(LayerType::Eltwise, "sum", &["s1", "abs"], &["sum"], &sum)
        .layer(LayerType::Pooling, "pool", &["s2"], &["pool"], &pool);
    desc
}

fn model() -> Vec<u8> {
    let weights: Vec<f32> = (0..54).map(|i| ((i % 7) as f32 - 3.0) * 0.25).collect();
    weights_for(&[(weights, vec![0.5, -1.0, 0.0])])
}

fn outputs(graph: &Graph) -> Vec<Tensor> {
    let mut ex = graph.extractor();
    ex.input(0, ramp3(2, 5, 5, 0.1)).unwrap();
    ["sum", "pool"]
        .iter()
        .map(|name| {
            let blob = graph.blobs.iter().position(|b| b.name.as_deref() == Some(*name));
            // binary graphs carry no names: blob indices are the same
            let blob = blob.unwrap_or_else(|| if *name == "sum" { 7 } else { 8 });
            ex.extract(blob).unwrap().into_tensor()
        })
        .collect()
}

fn assert_same_topology(a: &Graph, b: &Graph) {
    assert_eq!(a.nodes.len(), b.nodes.len());
    assert_eq!(a.blobs.len(), b.blobs.len());
    for (x, y) in a.nodes.iter().zip(b.nodes.iter()) {
        assert_eq!(x.type_index, y.type_index);
        assert_eq!(x.bottoms, y.bottoms);
        assert_eq!(x.tops, y.tops);
        assert_eq!(x.layer.one_blob_only(), y.layer.one_blob_only());
        assert_eq!(x.layer.support_inplace(), y.layer.support_inplace());
        assert_eq!(format!("{:?}", x.layer), format!("{:?}", y.layer));
    }
    for (x, y) in a.blobs.iter().zip(b.blobs.iter()) {
        assert_eq!(x.producer, y.producer);
        assert_eq!(x.consumers, y.consumers);
    }
}

#[test]
fn text_and_binary_agree() {
    setup_test_logger();
    let desc = desc();
    let mut text = desc.text_graph();
    let mut bin = desc.bin_graph();
    assert_same_topology(&text, &bin);
    assert_eq!(text.blobs[7].name.as_deref(), Some("sum"));
    text.load_model(&*model()).unwrap();
    bin.load_model(&*model()).unwrap();
    assert_same_topology(&text, &bin);
    assert_eq!(outputs(&text), outputs(&bin));
}

#[test]
fn memory_agrees_and_reports_consumed_bytes() {
    let desc = desc();
    let mut text = desc.text_graph();
    text.load_model(&*model()).unwrap();

    let params = Placed::new(&desc.to_bin(), 0);
    let weights = Placed::new(&model(), 0);
    let mut mem = Graph::default();
    assert_eq!(mem.load_param_mem(params.bytes()).unwrap(), params.bytes().len());
    assert_eq!(mem.load_model_mem(weights.bytes()).unwrap(), weights.bytes().len());
    assert_same_topology(&text, &mem);
    assert_eq!(outputs(&text), outputs(&mem));
}

#[test]
fn trailing_bytes_are_not_consumed() {
    let mut bytes = desc().to_bin();
    let len = bytes.len();
    bytes.extend([0xAB; 8]);
    let params = Placed::new(&bytes, 0);
    let mut graph = Graph::default();
    assert_eq!(graph.load_param_mem(params.bytes()).unwrap(), len);
}

#[test]
fn unaligned_buffers_are_rejected() {
    let params = Placed::new(&desc().to_bin(), 1);
    let weights = Placed::new(&model(), 2);
    let mut graph = Graph::default();
    assert!(graph.load_param_mem(params.bytes()).is_err());
    assert!(graph.nodes.is_empty());
    let mut graph = desc().text_graph();
    assert!(graph.load_model_mem(weights.bytes()).is_err());
    let conv = graph.nodes[1].layer_as::<cachenet_core::ops::cnn::Convolution>().unwrap();
    assert!(conv.weights.is_empty());
}

#[test]
fn truncated_memory_fails() {
    let bytes = desc().to_bin();
    let params = Placed::new(&bytes[..bytes.len() - 8], 0);
    assert!(Graph::default().load_param_mem(params.bytes()).is_err());
}

#[test]
fn files_and_mappings() {
    let desc = desc();
    let dir = tempfile::tempdir().unwrap();
    let write = |name: &str, content: &[u8]| {
        let path = dir.path().join(name);
        std::fs::File::create(&path).unwrap().write_all(content).unwrap();
        path
    };
    let param = write("graph.param", desc.to_text().as_bytes());
    let param_bin = write("graph.param.bin", &desc.to_bin());
    let bin = write("graph.bin", &model());

    let mut reference = desc.text_graph();
    reference.load_model(&*model()).unwrap();

    let mut from_path = Graph::default();
    from_path.load_param_path(&param).unwrap();
    from_path.load_model_path(&bin).unwrap();
    assert_eq!(outputs(&from_path), outputs(&reference));

    let mut from_bin_path = Graph::default();
    from_bin_path.load_param_bin_path(&param_bin).unwrap();
    from_bin_path.load_model_path(&bin).unwrap();
    assert_eq!(outputs(&from_bin_path), outputs(&reference));

    let mut mapped = Graph::default();
    assert_eq!(mapped.load_param_bin_mmap(&param_bin).unwrap(), desc.to_bin().len());
    assert_eq!(mapped.load_model_mmap(&bin).unwrap(), model().len());
    assert_same_topology(&mapped, &reference);
    assert_eq!(outputs(&mapped), outputs(&reference));

    let missing = Graph::default().load_param_path(dir.path().join("nope.param"));
    assert!(format!("{:?}", missing.unwrap_err()).contains("nope.param"));
}
