use approx::assert_abs_diff_eq;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::tensor::Tensor;

#[test]
fn test_new_and_property() {
    let v = Tensor::new(&[1., 2., 3.], &[3]);
    assert!(v.is_vector());
    assert_eq!(v.shape(), &[3]);
    assert_eq!(v.size(), 3);

    let m = Tensor::new(&[1., 2., 3., 4., 5., 6.], &[2, 3]);
    assert!(m.is_matrix());
    assert_eq!(m.dimension(), 2);
    assert_eq!(m.get(4), 5.);
    assert!(!m.is_same_shape(&v));
}

#[test]
#[should_panic(expected = "数据长度5与形状[2, 3]不匹配")]
fn test_new_with_wrong_data_len() {
    Tensor::new(&[1., 2., 3., 4., 5.], &[2, 3]);
}

#[test]
fn test_elementwise_ops() {
    let a = Tensor::new(&[1., -2., 3.], &[3]);
    let b = Tensor::new(&[0.5, 2., -1.], &[3]);
    assert_eq!(&a + &b, Tensor::new(&[1.5, 0., 2.], &[3]));
    assert_eq!(&a - &b, Tensor::new(&[0.5, -4., 4.], &[3]));
    assert_eq!(&a * &b, Tensor::new(&[0.5, -4., -3.], &[3]));
    assert_eq!(&a * 2., Tensor::new(&[2., -4., 6.], &[3]));
    assert_eq!(-&a, Tensor::new(&[-1., 2., -3.], &[3]));

    let mut c = a.clone();
    c += &b;
    c -= &a;
    assert_eq!(c, b);
    c.clear();
    assert!(c.is_zero());
}

#[test]
#[should_panic]
fn test_add_with_different_shape() {
    let a = Tensor::new(&[1., 2., 3.], &[3]);
    let b = Tensor::new(&[1., 2.], &[2]);
    let _ = &a + &b;
}

#[test]
fn test_mat_vec_and_transposed() {
    let w = Tensor::new(&[1., 2., 3., 4., 5., 6.], &[2, 3]);
    let x = Tensor::new(&[1., 0., -1.], &[3]);
    assert_eq!(w.mat_vec(&x), Tensor::new(&[-2., -2.], &[2]));

    let g = Tensor::new(&[1., 1.], &[2]);
    assert_eq!(w.t_mat_vec(&g), Tensor::new(&[5., 7., 9.], &[3]));
}

#[test]
fn test_add_outer() {
    let mut w = Tensor::zeros(&[2, 3]);
    let a = Tensor::new(&[1., 2.], &[2]);
    let b = Tensor::new(&[3., 4., 5.], &[3]);
    w.add_outer(&a, &b);
    w.add_outer(&a, &b);
    assert_eq!(w, Tensor::new(&[6., 8., 10., 12., 16., 20.], &[2, 3]));
}

#[test]
fn test_activations() {
    let x = Tensor::new(&[-1., 0., 2.], &[3]);
    assert_eq!(x.relu(), Tensor::new(&[0., 0., 2.], &[3]));
    assert_abs_diff_eq!(x.sigmoid().get(1), 0.5);
    assert_abs_diff_eq!(x.tanh().get(2), 2f64.tanh());

    let p = x.softmax();
    assert_abs_diff_eq!(p.sum(), 1.0, epsilon = 1e-12);
    assert_eq!(p.argmax(), 2);
    // 大数值下不溢出
    let big = Tensor::new(&[1000., 1000.], &[2]).softmax();
    assert_abs_diff_eq!(big, Tensor::new(&[0.5, 0.5], &[2]), epsilon = 1e-12);
}

#[test]
fn test_random_is_seeded() {
    let mut rng1 = StdRng::seed_from_u64(42);
    let mut rng2 = StdRng::seed_from_u64(42);
    let a = Tensor::new_random_with_rng(-0.1, 0.1, &[4, 5], &mut rng1);
    let b = Tensor::new_random_with_rng(-0.1, 0.1, &[4, 5], &mut rng2);
    assert_eq!(a, b);
    assert!(a.data_as_slice().iter().all(|x| (-0.1..0.1).contains(x)));
}
