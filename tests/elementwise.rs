use arcwise::approx::{approx_eq, bit_identical, RelativeEq};
use arcwise::ops::indexer::c_contiguous_strides;
use arcwise::{Element, ElementType, ElementwiseError, ElementwiseFunction, Operand, Queue, SharedBuffer};
use half::f16;
use num_complex::Complex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt::Debug;

const ROWS: usize = 13;
const COLS: usize = 11;

fn queue() -> &'static Queue {
    Queue::default_queue().unwrap()
}

fn unary_contig<T: Element>(f: ElementwiseFunction, x: &SharedBuffer) -> Vec<T> {
    let y = SharedBuffer::zeroed(x.element_type(), x.len());
    f.unary_contig(queue(), x.len(), Operand::new(x), Operand::new(&y), &[])
        .unwrap()
        .wait()
        .unwrap();
    y.to_vec().unwrap()
}

fn unary_strided<T: Element>(
    f: ElementwiseFunction,
    shape: &[usize],
    arg: Operand<'_>,
) -> Vec<T> {
    let nelems = shape.iter().product();
    let y = SharedBuffer::zeroed(arg.element_type(), nelems);
    let dense = c_contiguous_strides(shape);
    f.unary_strided(
        queue(),
        nelems,
        shape,
        arg,
        Operand::new(&y).with_strides(&dense),
        &[],
        &[],
    )
    .unwrap()
    .wait()
    .unwrap();
    y.to_vec().unwrap()
}

/// Runs `f` over `data` as a dense run, as a transposed view and as a
/// reversed view, and checks every strided result bit for bit against the
/// dense one.
fn check_layouts_agree<T>(f: ElementwiseFunction, data: &[T])
where
    T: Element + RelativeEq<T> + Debug,
{
    assert_eq!(data.len(), ROWS * COLS);
    let x = SharedBuffer::from_slice(data);
    let dense: Vec<T> = unary_contig(f, &x);

    let same: Vec<T> = unary_strided(f, &[ROWS, COLS], Operand::new(&x).with_strides(&[COLS as isize, 1]));
    assert!(bit_identical(&same[..], &dense[..]), "{f} dense strided {:?}", T::TYPE);

    let transposed: Vec<T> =
        unary_strided(f, &[COLS, ROWS], Operand::new(&x).with_strides(&[1, COLS as isize]));
    for j in 0..COLS {
        for i in 0..ROWS {
            let (a, b) = (&transposed[j * ROWS + i], &dense[i * COLS + j]);
            assert!(bit_identical(a, b), "{f} transposed ({i}, {j}): {a:?} vs {b:?}");
        }
    }

    let n = data.len();
    let reversed: Vec<T> = unary_strided(
        f,
        &[n],
        Operand::new(&x).with_offset(n as isize - 1).with_strides(&[-1]),
    );
    for k in 0..n {
        assert!(bit_identical(&reversed[k], &dense[n - 1 - k]), "{f} reversed {k}");
    }
}

fn rng() -> StdRng {
    StdRng::seed_from_u64(0x00a7_a2b1)
}

/// Overwrites the leading elements of `data` with `leading`.
fn with_leading<T: Copy>(mut data: Vec<T>, leading: &[T]) -> Vec<T> {
    data[..leading.len()].copy_from_slice(leading);
    data
}

/// Every pairing of `parts` as (real, imaginary).
fn component_grid<T: Copy>(parts: &[T]) -> Vec<Complex<T>> {
    parts
        .iter()
        .flat_map(|&re| parts.iter().map(move |&im| Complex::new(re, im)))
        .collect()
}

const REAL_SPECIALS: [f64; 13] = [
    f64::NAN,
    -f64::NAN,
    f64::INFINITY,
    f64::NEG_INFINITY,
    0.0,
    -0.0,
    1.0,
    -1.0,
    1e300,
    -1e300,
    f64::MIN_POSITIVE,
    4_503_599_627_370_497.0,
    3.5,
];

#[test]
fn test_real_layouts_are_bit_identical() {
    let mut rng = rng();
    let f64s: Vec<f64> = (0..ROWS * COLS).map(|_| rng.random_range(-0.999..0.999)).collect();
    let f64s = with_leading(f64s, &REAL_SPECIALS);
    let f32s: Vec<f32> = f64s.iter().map(|&v| v as f32).collect();
    let f16s: Vec<f16> = f32s.iter().map(|&v| f16::from_f32(v)).collect();

    for f in [ElementwiseFunction::Atan, ElementwiseFunction::Atanh] {
        check_layouts_agree(f, &f64s);
        check_layouts_agree(f, &f32s);
        check_layouts_agree(f, &f16s);
    }
}

#[test]
fn test_complex_layouts_are_bit_identical() {
    let mut rng = rng();
    let c128: Vec<Complex<f64>> = (0..ROWS * COLS)
        .map(|_| Complex::new(rng.random_range(-4.0..4.0), rng.random_range(-4.0..4.0)))
        .collect();
    let c64: Vec<Complex<f32>> = c128
        .iter()
        .map(|z| Complex::new(z.re as f32, z.im as f32))
        .collect();

    // non-finite, signed-zero and reciprocal-epsilon neighbour components
    let c128 = with_leading(
        c128,
        &component_grid(&[
            f64::NAN,
            f64::INFINITY,
            f64::NEG_INFINITY,
            0.0,
            -0.0,
            1.0,
            -2.5,
            4_503_599_627_370_496.0,
            4_503_599_627_370_497.0,
            1e300,
        ]),
    );
    let c64 = with_leading(
        c64,
        &component_grid(&[
            f32::NAN,
            f32::INFINITY,
            f32::NEG_INFINITY,
            0.0,
            -0.0,
            1.0,
            -2.5,
            8_388_608.0,
            8_388_609.0,
            1e30,
        ]),
    );

    for f in [ElementwiseFunction::Atan, ElementwiseFunction::Atanh] {
        check_layouts_agree(f, &c128);
        check_layouts_agree(f, &c64);
    }
}

#[test]
fn test_real_results_match_host() {
    let xs = [-1.0f64, -0.5, -0.0, 0.0, 0.25, 1.0, 2.0, f64::INFINITY, f64::NAN];
    let x = SharedBuffer::from_slice(&xs);
    let atan: Vec<f64> = unary_contig(ElementwiseFunction::Atan, &x);
    let atanh: Vec<f64> = unary_contig(ElementwiseFunction::Atanh, &x);
    for (i, v) in xs.iter().enumerate() {
        assert!(bit_identical(&atan[i], &v.atan()), "atan({v})");
        assert!(bit_identical(&atanh[i], &v.atanh()), "atanh({v})");
    }
}

#[test]
fn test_half_precision_rounds_single_precision_result() {
    let xs: Vec<f16> = (-20..=20).map(|i| f16::from_f32(i as f32 / 16.0)).collect();
    let x = SharedBuffer::from_slice(&xs);
    let out: Vec<f16> = unary_contig(ElementwiseFunction::Atan, &x);
    for (v, y) in xs.iter().zip(&out) {
        assert_eq!(y.to_bits(), f16::from_f32(v.to_f32().atan()).to_bits());
    }
}

#[test]
fn test_golden_complex_atan() {
    let z = Complex::new(1.0f64, 64_387_093.0);
    let x = SharedBuffer::from_slice(&[z]);
    let out: Vec<Complex<f64>> = unary_contig(ElementwiseFunction::Atan, &x);
    assert!(approx_eq(&out[0], &z.atan()), "{:?} vs {:?}", out[0], z.atan());
}

#[test]
fn test_atan_of_imaginary_axis_is_atanh() {
    // atan(i x) / i == atanh(x) for real x
    let xs: Vec<f64> = (1..10).map(|k| f64::from(k) / 10.0).collect();
    let iz: Vec<Complex<f64>> = xs.iter().map(|&v| Complex::new(0.0, v)).collect();
    let z: Vec<Complex<f64>> = xs.iter().map(|&v| Complex::new(v, 0.0)).collect();

    let atan_iz: Vec<Complex<f64>> =
        unary_contig(ElementwiseFunction::Atan, &SharedBuffer::from_slice(&iz));
    let atanh_z: Vec<Complex<f64>> =
        unary_contig(ElementwiseFunction::Atanh, &SharedBuffer::from_slice(&z));
    let atanh_x: Vec<f64> = unary_contig(ElementwiseFunction::Atanh, &SharedBuffer::from_slice(&xs));

    for (k, &v) in xs.iter().enumerate() {
        let w = atan_iz[k] / Complex::i();
        assert!((w.re - atanh_z[k].re).abs() <= 1e-13, "x = {v}");
        assert!(w.im.abs() <= 1e-13, "x = {v}");
        assert!((w.re - atanh_x[k]).abs() <= 1e-13, "x = {v}");
        assert!((atanh_x[k] - v.atanh()).abs() <= 1e-13, "x = {v}");
    }
}

#[test]
fn test_complex_special_values_through_queue() {
    use std::f64::consts::FRAC_PI_2;
    let inputs = [
        Complex::new(f64::NAN, f64::INFINITY),
        Complex::new(f64::INFINITY, f64::NAN),
        Complex::new(-0.0, f64::NAN),
        Complex::new(3.0, f64::NAN),
        Complex::new(1e300, -2.0),
        Complex::new(0.0, 0.0),
    ];
    let x = SharedBuffer::from_slice(&inputs);
    let out: Vec<Complex<f64>> = unary_contig(ElementwiseFunction::Atanh, &x);

    assert_eq!((out[0].re, out[0].im), (0.0, FRAC_PI_2));
    assert_eq!(out[1].re, 0.0);
    assert!(out[1].im.is_nan());
    assert!(out[2].re.is_sign_negative() && out[2].re == 0.0 && out[2].im.is_nan());
    assert!(out[3].re.is_nan() && out[3].im.is_nan());
    assert_eq!(out[4], Complex::new(0.0, -FRAC_PI_2));
    assert_eq!(out[5], Complex::new(0.0, 0.0));
}

#[test]
fn test_complex_atan_special_values_through_queue() {
    use std::f64::consts::FRAC_PI_2;
    let inputs = [
        Complex::new(f64::INFINITY, f64::NAN),
        Complex::new(f64::NEG_INFINITY, f64::NAN),
        Complex::new(f64::NAN, 0.0),
        Complex::new(f64::NAN, -0.0),
        Complex::new(f64::NAN, f64::INFINITY),
        Complex::new(f64::NAN, f64::NAN),
        Complex::new(1.0, f64::NAN),
        Complex::new(1e300, 2.0),
        Complex::new(-1e300, 2.0),
        Complex::new(f64::INFINITY, 1.0),
        Complex::new(0.0, 0.0),
    ];
    let x = SharedBuffer::from_slice(&inputs);
    let out: Vec<Complex<f64>> = unary_contig(ElementwiseFunction::Atan, &x);
    let strided: Vec<Complex<f64>> = unary_strided(
        ElementwiseFunction::Atan,
        &[inputs.len()],
        Operand::new(&x).with_strides(&[1]),
    );
    assert!(bit_identical(&out[..], &strided[..]));

    assert_eq!(out[0].re, FRAC_PI_2);
    assert_eq!(out[0].im, 0.0);
    assert_eq!(out[1].re, -FRAC_PI_2);
    assert_eq!(out[1].im, 0.0);
    assert!(out[2].re.is_nan() && out[2].im.to_bits() == 0.0f64.to_bits());
    assert!(out[3].re.is_nan() && out[3].im.to_bits() == (-0.0f64).to_bits());
    assert!(out[4].re.is_nan() && out[4].im.to_bits() == 0.0f64.to_bits());
    assert!(out[5].re.is_nan() && out[5].im.is_nan());
    assert!(out[6].re.is_nan() && out[6].im.is_nan());
    assert!(bit_identical(&out[7], &Complex::new(FRAC_PI_2, 0.0)));
    assert!(bit_identical(&out[8], &Complex::new(-FRAC_PI_2, 0.0)));
    assert!(bit_identical(&out[9], &Complex::new(FRAC_PI_2, 0.0)));
    assert_eq!(out[10], Complex::new(0.0, 0.0));
}

#[test]
fn test_single_precision_reciprocal_epsilon_boundary() {
    use std::f32::consts::FRAC_PI_2;
    let edge = 1.0 / f32::EPSILON;
    let above = edge + 1.0;
    let inputs = [
        Complex::new(above, 0.5f32),
        Complex::new(0.5, -above),
        Complex::new(edge, 0.5),
        Complex::new(0.5, -edge),
    ];
    let x = SharedBuffer::from_slice(&inputs);
    let atanh: Vec<Complex<f32>> = unary_contig(ElementwiseFunction::Atanh, &x);

    // beyond 1/eps the result saturates exactly
    assert!(bit_identical(&atanh[0], &Complex::new(0.0, FRAC_PI_2)));
    assert!(bit_identical(&atanh[1], &Complex::new(0.0, -FRAC_PI_2)));
    // at 1/eps it is still the closed form
    assert!(bit_identical(&atanh[2], &inputs[2].atanh()));
    assert!(bit_identical(&atanh[3], &inputs[3].atanh()));

    let atan: Vec<Complex<f32>> = unary_contig(ElementwiseFunction::Atan, &x);
    assert!(bit_identical(&atan[1], &Complex::new(FRAC_PI_2, 0.0)));
}

#[test]
fn test_atan2_paths_agree_with_host() {
    let mut rng = rng();
    let n = ROWS * COLS;
    let ys: Vec<f32> = (0..n).map(|_| rng.random_range(-10.0..10.0)).collect();
    let xs: Vec<f32> = (0..COLS).map(|_| rng.random_range(-10.0..10.0)).collect();
    let y = SharedBuffer::from_slice(&ys);
    let x = SharedBuffer::from_slice(&xs);
    let res = SharedBuffer::zeroed(ElementType::Float32, n);

    // x broadcast along the rows
    ElementwiseFunction::Atan2
        .binary_strided(
            queue(),
            n,
            &[ROWS, COLS],
            Operand::new(&y).with_strides(&[COLS as isize, 1]),
            Operand::new(&x).with_strides(&[0, 1]),
            Operand::new(&res).with_strides(&[COLS as isize, 1]),
            &[],
            &[],
        )
        .unwrap()
        .wait()
        .unwrap();
    let strided: Vec<f32> = res.to_vec().unwrap();
    for i in 0..ROWS {
        for j in 0..COLS {
            let k = i * COLS + j;
            assert_eq!(strided[k].to_bits(), ys[k].atan2(xs[j]).to_bits());
        }
    }

    let expanded: Vec<f32> = (0..n).map(|k| xs[k % COLS]).collect();
    let x_full = SharedBuffer::from_slice(&expanded);
    let dense = SharedBuffer::zeroed(ElementType::Float32, n);
    ElementwiseFunction::Atan2
        .binary_contig(queue(), n, Operand::new(&y), Operand::new(&x_full), Operand::new(&dense), &[])
        .unwrap()
        .wait()
        .unwrap();
    assert!(bit_identical(&dense.to_vec::<f32>().unwrap()[..], &strided[..]));
}

#[test]
fn test_atan2_positive_infinity_denominator() {
    let ys = [-3.0f64, 0.0, -0.0, 5.0, f64::INFINITY];
    let xs = [f64::INFINITY; 5];
    let y = SharedBuffer::from_slice(&ys);
    let x = SharedBuffer::from_slice(&xs);
    let r = SharedBuffer::zeroed(ElementType::Float64, 5);
    ElementwiseFunction::Atan2
        .binary_contig(queue(), 5, Operand::new(&y), Operand::new(&x), Operand::new(&r), &[])
        .unwrap()
        .wait()
        .unwrap();
    let out: Vec<f64> = r.to_vec().unwrap();
    let bits: Vec<u64> = out[..4].iter().map(|v| v.to_bits()).collect();
    assert_eq!(
        bits,
        [(-0.0f64).to_bits(), 0.0f64.to_bits(), (-0.0f64).to_bits(), 0.0f64.to_bits()]
    );
    assert_eq!(out[4], std::f64::consts::FRAC_PI_4);
}

#[test]
fn test_unsupported_types_leave_output_untouched() {
    let x = SharedBuffer::from_slice(&[1i32, 2, 3]);
    let y = SharedBuffer::from_slice(&[7i32, 7, 7]);
    let err = ElementwiseFunction::Atan
        .unary_contig(queue(), 3, Operand::new(&x), Operand::new(&y), &[])
        .unwrap_err();
    assert_eq!(
        err,
        ElementwiseError::UnsupportedType {
            function: "atan",
            inputs: vec![ElementType::Int32]
        }
    );
    assert_eq!(y.to_vec::<i32>().unwrap(), vec![7, 7, 7]);

    let a = SharedBuffer::from_slice(&[1.0f32]);
    let b = SharedBuffer::from_slice(&[1.0f64]);
    let r = SharedBuffer::from_slice(&[9.0f64]);
    let err = ElementwiseFunction::Atan2
        .binary_contig(queue(), 1, Operand::new(&a), Operand::new(&b), Operand::new(&r), &[])
        .unwrap_err();
    assert!(matches!(err, ElementwiseError::UnsupportedType { function: "atan2", .. }));
    assert_eq!(r.to_vec::<f64>().unwrap(), vec![9.0]);

    let c = SharedBuffer::from_slice(&[Complex::new(1.0f64, 1.0)]);
    let err = ElementwiseFunction::Atan2
        .binary_contig(queue(), 1, Operand::new(&c), Operand::new(&c), Operand::new(&r), &[])
        .unwrap_err();
    assert!(matches!(err, ElementwiseError::UnsupportedType { .. }));
}

#[test]
fn test_in_place_update() {
    let xs = [0.1f64, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 0.95];
    let x = SharedBuffer::from_slice(&xs);
    ElementwiseFunction::Atanh
        .unary_contig(queue(), xs.len(), Operand::new(&x), Operand::new(&x), &[])
        .unwrap()
        .wait()
        .unwrap();
    let out: Vec<f64> = x.to_vec().unwrap();
    for (v, y) in xs.iter().zip(&out) {
        assert_eq!(y.to_bits(), v.atanh().to_bits());
    }

    // strided in place over a transposed view of the same memory
    let m = SharedBuffer::from_slice(&[0.5f32, -0.5, 0.25, -0.25, 0.0, 1.0]);
    let view = [1isize, 3];
    ElementwiseFunction::Atan
        .unary_strided(
            queue(),
            6,
            &[3, 2],
            Operand::new(&m).with_strides(&view),
            Operand::new(&m).with_strides(&view),
            &[],
            &[],
        )
        .unwrap()
        .wait()
        .unwrap();
    let expected: Vec<f32> = [0.5f32, -0.5, 0.25, -0.25, 0.0, 1.0].iter().map(|v| v.atan()).collect();
    assert_eq!(m.to_vec::<f32>().unwrap(), expected);
}

#[test]
fn test_empty_input_completes() {
    let x = SharedBuffer::zeroed(ElementType::Complex64, 0);
    let out: Vec<Complex<f32>> = unary_contig(ElementwiseFunction::Atan, &x);
    assert!(out.is_empty());

    let y = SharedBuffer::zeroed(ElementType::Complex64, 0);
    ElementwiseFunction::Atanh
        .unary_strided(
            queue(),
            0,
            &[4, 0],
            Operand::new(&x).with_strides(&[0, 0]),
            Operand::new(&y).with_strides(&[0, 0]),
            &[],
            &[],
        )
        .unwrap()
        .wait()
        .unwrap();
}
