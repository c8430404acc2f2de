mod graph_backward;

use approx::assert_abs_diff_eq;

use crate::nn::{Graph, GraphError, SharedParameter};

/// 中心差分的步长
pub(super) const EPSILON: f64 = 1e-5;

/// 用中心差分 (L(θ+ε) - L(θ-ε)) / 2ε 检查`params`中每个元素的解析梯度。
/// `build`每次都要构建一张新图（并设置好目标类别），图的损失为所有softmax目标的交叉熵之和
pub(super) fn check_gradients<F>(
    params: &[SharedParameter],
    mut build: F,
    tolerance: f64,
) -> Result<(), GraphError>
where
    F: FnMut() -> Result<Graph, GraphError>,
{
    for p in params {
        p.borrow_mut().clear_grad();
    }
    let mut graph = build()?;
    graph.forward()?;
    graph.backward()?;
    let analytic: Vec<_> = params.iter().map(|p| p.borrow().grad().clone()).collect();

    for (p, grad) in params.iter().zip(&analytic) {
        let size = p.borrow().size();
        for k in 0..size {
            p.borrow_mut().add_epsilon(k, EPSILON);
            let plus = loss_of(&mut build)?;
            p.borrow_mut().add_epsilon(k, -2.0 * EPSILON);
            let minus = loss_of(&mut build)?;
            p.borrow_mut().add_epsilon(k, EPSILON);

            let numeric = (plus - minus) / (2.0 * EPSILON);
            assert_abs_diff_eq!(grad.get(k), numeric, epsilon = tolerance);
        }
    }
    Ok(())
}

pub(super) fn loss_of<F>(build: &mut F) -> Result<f64, GraphError>
where
    F: FnMut() -> Result<Graph, GraphError>,
{
    let mut graph = build()?;
    graph.forward()?;
    Ok(graph.loss())
}
