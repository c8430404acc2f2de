use std::rc::Rc;

use approx::assert_abs_diff_eq;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::assert_err;
use crate::nn::{
    Activation, CellType, Graph, GraphError, Layer, Linear, NodeId, RecurrentLayer,
    SharedParameter,
};
use crate::tensor::Tensor;

/// 一个最小的双向结构：前向层f与后向层b各跑一遍3个输入，每个位置的[f_i, b_i]接一个softmax分类头
struct BiGraph {
    graph: Graph,
    forward_states: Vec<NodeId>,
    params: Vec<SharedParameter>,
}

fn build_bi_graph(cell_type: CellType) -> Result<BiGraph, GraphError> {
    let mut rng = StdRng::seed_from_u64(7);
    let f_layer = Rc::new(RecurrentLayer::new("f", cell_type, &[2], 3, &mut rng));
    let b_layer = Rc::new(RecurrentLayer::new("b", cell_type, &[2], 3, &mut rng));
    let head = Rc::new(Linear::new("head", &[3, 3], 4, &mut rng));
    let softmax = Rc::new(Layer::Activation(Activation::Softmax));

    let mut graph = Graph::new();
    let inputs = (0..3)
        .map(|_| graph.constant(Tensor::new_random_with_rng(-1.0, 1.0, &[2], &mut rng)))
        .collect::<Result<Vec<_>, _>>()?;
    let f_init = graph.initial_state(&f_layer);
    let b_init = graph.initial_state(&b_layer);

    let mut forward_states = Vec::new();
    let mut pred = f_init;
    for &x in &inputs {
        pred = graph.recurrent(&f_layer, pred, &[x])?;
        forward_states.push(pred);
    }
    let mut backward_states = vec![NodeId(0); inputs.len()];
    let mut pred = b_init;
    for (i, &x) in inputs.iter().enumerate().rev() {
        pred = graph.recurrent(&b_layer, pred, &[x])?;
        backward_states[i] = pred;
    }
    for (i, (&f, &b)) in forward_states.iter().zip(&backward_states).enumerate() {
        let z = graph.composite(&head, &[f, b])?;
        let p = graph.simple(&softmax, z)?;
        graph.set_target(p, i % 4)?;
    }

    let mut params = f_layer.parameters();
    params.extend(b_layer.parameters());
    params.extend(head.parameters());
    Ok(BiGraph {
        graph,
        forward_states,
        params,
    })
}

fn collect_grads(params: &[SharedParameter]) -> Vec<Tensor> {
    params.iter().map(|p| p.borrow().grad().clone()).collect()
}

fn clear_grads(params: &[SharedParameter]) {
    for p in params {
        p.borrow_mut().clear_grad();
    }
}

/// 测试反向传播按前向调度的镜像执行，并且两次反向传播的结果一致（节点梯度会先被清空）
#[test]
fn test_backward_mirrors_schedule() -> Result<(), GraphError> {
    let BiGraph {
        mut graph, params, ..
    } = build_bi_graph(CellType::Lstm)?;
    graph.forward()?;

    graph.backward()?;
    let first = collect_grads(&params);
    clear_grads(&params);
    graph.backward()?;
    let second = collect_grads(&params);

    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a, b);
        assert!(!a.is_zero());
    }
    Ok(())
}

/// 测试在同一张图上重复前向传播得到完全相同的输出
#[test]
fn test_forward_is_deterministic() -> Result<(), GraphError> {
    let BiGraph { mut graph, .. } = build_bi_graph(CellType::Gru)?;
    graph.forward()?;
    let first: Vec<Tensor> = graph
        .schedule()
        .iter()
        .map(|&id| graph.value(id).cloned())
        .collect::<Result<_, _>>()?;
    let first_loss = graph.loss();

    graph.forward()?;
    for (k, &id) in graph.schedule().iter().enumerate() {
        assert_eq!(graph.value(id)?, &first[k]);
    }
    assert_eq!(graph.loss(), first_loss);
    Ok(())
}

/// 测试违反反向顺序（某节点先于其消费者被反向传播）会被检测出来，
/// 而不检查顺序时会得到错误的梯度
#[test]
fn test_backward_order_violation() -> Result<(), GraphError> {
    let BiGraph {
        mut graph,
        forward_states,
        params,
    } = build_bi_graph(CellType::Lstm)?;
    graph.forward()?;

    // 正确顺序下的梯度
    graph.backward()?;
    let expected = collect_grads(&params);
    clear_grads(&params);

    // 把前向层中f_0与f_1的反向顺序对调：f_0在其消费者f_1之前被处理
    let mut wrong_order: Vec<NodeId> = graph.schedule().iter().rev().copied().collect();
    let pos_0 = wrong_order.iter().position(|&id| id == forward_states[0]).unwrap();
    let pos_1 = wrong_order.iter().position(|&id| id == forward_states[1]).unwrap();
    wrong_order.swap(pos_0, pos_1);

    // 1. 检查顺序的反向传播应报错
    let result = graph.backward_in_order(&wrong_order);
    assert_err!(result, GraphError::BackwardOrder(msg) if msg.contains("消费者"));
    clear_grads(&params);

    // 2. 不检查顺序时，至少有一个参数的梯度与正确值不同
    graph.backward_in_order_unchecked(&wrong_order)?;
    let wrong = collect_grads(&params);
    let differs = expected
        .iter()
        .zip(&wrong)
        .any(|(a, b)| !approx::abs_diff_eq!(a, b, epsilon = 1e-9));
    assert!(differs);
    Ok(())
}

/// 测试重复反向传播同一节点会被拒绝
#[test]
fn test_backward_twice_rejected() -> Result<(), GraphError> {
    let BiGraph { mut graph, .. } = build_bi_graph(CellType::Rnn)?;
    graph.forward()?;
    let mut order: Vec<NodeId> = graph.schedule().iter().rev().copied().collect();
    let first = order[0];
    order.insert(1, first);
    assert_err!(
        graph.backward_in_order(&order),
        GraphError::BackwardOrder(msg) if msg.contains("重复")
    );
    Ok(())
}

/// 测试前向顺序同样受检：父节点未计算时报错
#[test]
fn test_forward_order_violation() -> Result<(), GraphError> {
    let BiGraph { mut graph, .. } = build_bi_graph(CellType::Rnn)?;
    let order: Vec<NodeId> = graph.schedule().iter().rev().copied().collect();
    assert_err!(
        graph.forward_in_order(&order),
        GraphError::ComputationError(msg) if msg.contains("尚未完成前向计算")
    );
    Ok(())
}

/// 测试softmax交叉熵的损失与梯度种子 p - one_hot(target)
#[test]
fn test_softmax_target_seed() -> Result<(), GraphError> {
    let mut graph = Graph::new();
    let softmax = Rc::new(Layer::Activation(Activation::Softmax));
    let x = graph.constant(Tensor::new(&[1.0, 2.0, 3.0], &[3]))?;
    let p = graph.simple(&softmax, x)?;
    graph.set_target(p, 0)?;
    graph.forward()?;

    let probs = graph.value(p)?.clone();
    assert_abs_diff_eq!(graph.loss(), -probs.get(0).ln(), epsilon = 1e-12);

    graph.backward()?;
    let expected = &probs - &Tensor::one_hot(3, 0);
    assert_abs_diff_eq!(graph.grad(x)?, &expected, epsilon = 1e-12);

    // 非softmax节点不能设置目标，越界的目标也不行
    assert_err!(graph.set_target(x, 0), GraphError::InvalidOperation(_));
    assert_err!(graph.set_target(p, 3), GraphError::InvalidOperation(_));
    assert_err!(graph.set_target(NodeId(99), 0), GraphError::NodeNotFound(NodeId(99)));
    Ok(())
}
