/*
 * @Author       : 老董
 * @Date         : 2024-02-10 21:05:37
 * @Description  : 前向/反向传播的执行：按显式调度序列遍历节点。
 *                 反向传播要求每个节点在其全部消费者都已回传梯度后才能被反向传播，违反时返回错误
 */

use log::debug;

use super::{Graph, GraphError};
use crate::nn::NodeId;
use crate::nn::nodes::NodeState;

impl Graph {
    /// 按构建时记录的调度序列执行前向传播
    pub fn forward(&mut self) -> Result<(), GraphError> {
        let schedule = self.schedule.clone();
        self.forward_in_order(&schedule)
    }

    /// 按外部给定的顺序执行前向传播。每个节点的父节点必须在该顺序中排在它之前
    pub fn forward_in_order(&mut self, order: &[NodeId]) -> Result<(), GraphError> {
        let mut computed = vec![false; self.nodes.len()];
        for &id in order {
            let node = self.get_node(id)?;
            if let Some(p) = node.parents().iter().find(|p| !computed[p.0]) {
                return Err(GraphError::ComputationError(format!(
                    "{}的父节点{}尚未完成前向计算",
                    node, p
                )));
            }
            self.fprop_node(id)?;
            computed[id.0] = true;
        }
        Ok(())
    }

    /// 按前向调度序列的逆序执行反向传播（会先清空所有节点的梯度）
    pub fn backward(&mut self) -> Result<(), GraphError> {
        let order: Vec<NodeId> = self.schedule.iter().rev().copied().collect();
        self.backward_in_order(&order)
    }

    /// 按外部给定的顺序执行反向传播（会先清空所有节点的梯度）。
    /// 若某节点在其所有消费者完成反向传播之前就被处理，或被重复处理，则返回`BackwardOrder`错误
    pub fn backward_in_order(&mut self, order: &[NodeId]) -> Result<(), GraphError> {
        let mut pending = vec![0usize; self.nodes.len()];
        for node in &self.nodes {
            for p in node.parents() {
                pending[p.0] += 1;
            }
        }
        let mut done = vec![false; self.nodes.len()];

        self.clear_grads();
        for &id in order {
            let node = self.get_node(id)?;
            if done[id.0] {
                return Err(GraphError::BackwardOrder(format!("{node}被重复反向传播")));
            }
            if pending[id.0] > 0 {
                return Err(GraphError::BackwardOrder(format!(
                    "{}还有{}个消费者尚未完成反向传播",
                    node, pending[id.0]
                )));
            }
            for p in node.parents() {
                pending[p.0] -= 1;
            }
            self.bprop_node(id)?;
            done[id.0] = true;
        }
        debug!("完成{}个节点的反向传播", order.len());
        Ok(())
    }

    /// 不做任何顺序检查的反向传播，顺序错误时会得到错误的梯度
    #[cfg(test)]
    pub(crate) fn backward_in_order_unchecked(&mut self, order: &[NodeId]) -> Result<(), GraphError> {
        self.clear_grads();
        for &id in order {
            self.bprop_node(id)?;
        }
        Ok(())
    }

    fn clear_grads(&mut self) {
        for node in &mut self.nodes {
            node.state_mut().clear_grad();
        }
    }

    fn fprop_node(&mut self, id: NodeId) -> Result<(), GraphError> {
        // 父节点的id总是小于子节点，所以可以把arena从当前节点处切开，分别借用
        let (before, rest) = self.nodes.split_at_mut(id.0);
        let before: &[_] = before;
        let node = rest.first_mut().ok_or(GraphError::NodeNotFound(id))?;
        let parents: Vec<&NodeState> = node
            .parents()
            .iter()
            .map(|p| before[p.0].state())
            .collect();
        node.fprop(&parents)
    }

    fn bprop_node(&mut self, id: NodeId) -> Result<(), GraphError> {
        let node = self.get_node(id)?;
        let parents: Vec<&NodeState> = node
            .parents()
            .iter()
            .map(|p| self.nodes[p.0].state())
            .collect();
        let contributions = node.bprop(&parents)?;
        let parent_ids = node.parents().to_vec();

        for (p, contribution) in parent_ids.iter().zip(&contributions) {
            self.nodes[p.0].state_mut().accumulate(contribution)?;
        }
        Ok(())
    }
}
