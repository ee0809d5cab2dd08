use approx::assert_relative_eq;

use crate::{
    Client, Computation, ComputationBuilder, ElementType, Error, ErrorKind, Literal, Padding,
    Shape, XlaOp,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn execute(computation: &Computation, arguments: &[Literal]) -> Literal {
    let client = Client::cpu().unwrap();
    client.compile(computation).unwrap().execute(arguments).unwrap()
}

fn build(
    name: &str,
    f: impl FnOnce(&mut ComputationBuilder) -> crate::Result<XlaOp>,
) -> Computation {
    let mut builder = ComputationBuilder::new(name);
    let root = f(&mut builder).unwrap();
    builder.build_with_root(root).unwrap()
}

type BinaryFn = fn(&mut ComputationBuilder, XlaOp, XlaOp) -> crate::Result<XlaOp>;

fn scalar_binary(name: &str, ty: ElementType, f: BinaryFn) -> Computation {
    build(name, |b| {
        let x = b.parameter(Shape::scalar(ty), None, "x")?;
        let y = b.parameter(Shape::scalar(ty), None, "y")?;
        f(b, x, y)
    })
}

/// Add, Mul, Div and Pow of two equally shaped constants.
fn arithmetic(lhs: &Literal, rhs: &Literal) -> Vec<Literal> {
    let comp = build("arithmetic", |b| {
        let x = b.constant(lhs)?;
        let y = b.constant(rhs)?;
        let ops = [b.add(x, y)?, b.mul(x, y)?, b.div(x, y)?, b.pow(x, y)?];
        b.tuple(&ops)
    });
    execute(&comp, &[]).to_tuple().unwrap()
}

#[test]
fn test_arithmetic_across_types() {
    let out = arithmetic(
        &Literal::vector(&[true, false, true, false]),
        &Literal::vector(&[true, true, false, false]),
    );
    assert_eq!(out[0], Literal::vector(&[true, true, true, false]));
    assert_eq!(out[1], Literal::vector(&[true, false, false, false]));
    assert_eq!(out[2], Literal::vector(&[true, false, true, true]));
    assert_eq!(out[3], Literal::vector(&[true, false, true, true]));

    let out = arithmetic(&Literal::vector(&[6i32, 8, 9]), &Literal::vector(&[2i32, 4, 3]));
    assert_eq!(out[0], Literal::vector(&[8i32, 12, 12]));
    assert_eq!(out[1], Literal::vector(&[12i32, 32, 27]));
    assert_eq!(out[2], Literal::vector(&[3i32, 2, 3]));
    assert_eq!(out[3], Literal::vector(&[36i32, 4096, 729]));

    let out = arithmetic(&Literal::vector(&[6i64, 8, 9]), &Literal::vector(&[2i64, 4, 3]));
    assert_eq!(out[0], Literal::vector(&[8i64, 12, 12]));
    assert_eq!(out[1], Literal::vector(&[12i64, 32, 27]));
    assert_eq!(out[2], Literal::vector(&[3i64, 2, 3]));
    assert_eq!(out[3], Literal::vector(&[36i64, 4096, 729]));

    let expected = [[8.0, 12.0, 12.0], [12.0, 32.0, 27.0], [3.0, 2.0, 3.0], [36.0, 4096.0, 729.0]];
    let out = arithmetic(
        &Literal::vector(&[6.0f32, 8.0, 9.0]),
        &Literal::vector(&[2.0f32, 4.0, 3.0]),
    );
    for (got, want) in out.iter().zip(&expected) {
        for (g, w) in got.typed_buf::<f32>().unwrap().iter().zip(want) {
            assert_relative_eq!(*g, *w as f32, max_relative = 1e-6);
        }
    }
    let out = arithmetic(
        &Literal::vector(&[6.0f64, 8.0, 9.0]),
        &Literal::vector(&[2.0f64, 4.0, 3.0]),
    );
    for (got, want) in out.iter().zip(&expected) {
        for (g, w) in got.typed_buf::<f64>().unwrap().iter().zip(want) {
            assert_relative_eq!(*g, *w, max_relative = 1e-12);
        }
    }
}

#[test]
fn test_arithmetic_f32() {
    let comp = build("arith", |b| {
        let x = b.constant_r1(&[1.0f32, 2.0, 6.0])?;
        let y = b.constant_r1(&[4.0f32, 5.0, 4.0])?;
        let sum = b.add(x, y)?;
        let quot = b.div(sum, y)?;
        b.pow(quot, y)
    });
    let out = execute(&comp, &[]).to_vec::<f32>().unwrap();
    assert_relative_eq!(out[0], 1.25f32.powf(4.0), epsilon = 1e-5);
    assert_relative_eq!(out[1], 1.4f32.powf(5.0), epsilon = 1e-5);
    assert_relative_eq!(out[2], 2.5f32.powf(4.0), epsilon = 1e-4);
}

#[test]
fn test_arithmetic_f64() {
    let comp = build("mul", |b| {
        let x = b.constant_r1(&[2.5f64, -1.0])?;
        let y = b.constant_r1(&[4.0f64, 3.0])?;
        let prod = b.mul(x, y)?;
        b.sub(prod, x)
    });
    assert_eq!(execute(&comp, &[]), Literal::vector(&[7.5f64, -2.0]));
}

#[test]
fn test_integer_division_truncates() {
    let comp = build("div", |b| {
        let x = b.constant_r1(&[7i32, -7, 9])?;
        let y = b.constant_r1(&[2i32, 2, -4])?;
        b.div(x, y)
    });
    assert_eq!(execute(&comp, &[]), Literal::vector(&[3i32, -3, -2]));
}

#[test]
fn test_integer_pow_and_wrapping() {
    let comp = build("pow", |b| {
        let x = b.constant_r1(&[2i64, 3, 10])?;
        let y = b.constant_r1(&[10i64, 4, 0])?;
        b.pow(x, y)
    });
    assert_eq!(execute(&comp, &[]), Literal::vector(&[1024i64, 81, 1]));

    let comp = build("wrap", |b| {
        let x = b.constant_r0(u32::MAX)?;
        let one = b.constant_r0(1u32)?;
        b.add(x, one)
    });
    assert_eq!(execute(&comp, &[]), Literal::scalar(0u32));
}

#[test]
fn test_pred_arithmetic_and_logic() {
    let comp = build("pred", |b| {
        let x = b.constant_r1(&[true, true, false, false])?;
        let y = b.constant_r1(&[true, false, true, false])?;
        let sum = b.add(x, y)?;
        let both = b.and(x, y)?;
        b.tuple(&[sum, both])
    });
    let out = execute(&comp, &[]).to_tuple().unwrap();
    assert_eq!(out[0], Literal::vector(&[true, true, true, false]));
    assert_eq!(out[1], Literal::vector(&[true, false, false, false]));
}

#[test]
fn test_max_min_unsigned() {
    let comp = build("max_min", |b| {
        let x = b.constant_r1(&[1u64, 9, 5])?;
        let y = b.constant_r1(&[4u64, 2, 5])?;
        let hi = b.max(x, y)?;
        let lo = b.min(x, y)?;
        b.sub(hi, lo)
    });
    assert_eq!(execute(&comp, &[]), Literal::vector(&[3u64, 7, 0]));
}

#[test]
fn test_comparisons_with_nan() {
    let comp = build("cmp", |b| {
        let x = b.constant_r1(&[1.0f32, f32::NAN, 3.0])?;
        let y = b.constant_r1(&[1.0f32, f32::NAN, 2.0])?;
        let eq = b.eq(x, y)?;
        let ne = b.ne(x, y)?;
        let gt = b.gt(x, y)?;
        b.tuple(&[eq, ne, gt])
    });
    let out = execute(&comp, &[]).to_tuple().unwrap();
    assert_eq!(out[0], Literal::vector(&[true, false, false]));
    assert_eq!(out[1], Literal::vector(&[false, true, true]));
    assert_eq!(out[2], Literal::vector(&[false, false, true]));
}

#[test]
fn test_unary_ops() {
    let comp = build("unary", |b| {
        let x = b.constant_r1(&[-1.5f64, 2.25])?;
        let floor = b.floor(x)?;
        let ceil = b.ceil(x)?;
        let abs = b.abs(x)?;
        let neg = b.neg(x)?;
        b.tuple(&[floor, ceil, abs, neg])
    });
    let out = execute(&comp, &[]).to_tuple().unwrap();
    assert_eq!(out[0], Literal::vector(&[-2.0f64, 2.0]));
    assert_eq!(out[1], Literal::vector(&[-1.0f64, 3.0]));
    assert_eq!(out[2], Literal::vector(&[1.5f64, 2.25]));
    assert_eq!(out[3], Literal::vector(&[1.5f64, -2.25]));

    let comp = build("transcendental", |b| {
        let x = b.constant_r1(&[3.3f32, 12.1])?;
        let e = b.exp(x)?;
        b.log(e)
    });
    let out = execute(&comp, &[]).to_vec::<f32>().unwrap();
    assert_relative_eq!(out[0], 3.3, epsilon = 1e-5);
    assert_relative_eq!(out[1], 12.1, epsilon = 1e-4);

    let comp = build("not", |b| {
        let x = b.constant_r1(&[true, false, true])?;
        b.not(x)
    });
    assert_eq!(execute(&comp, &[]), Literal::vector(&[false, true, false]));
}

#[test]
fn test_broadcast_dimensions() {
    let matrix = Literal::array(&[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0], &[3, 3]).unwrap();
    let rows = build("rows", |b| {
        let m = b.constant(&matrix)?;
        let v = b.constant_r1(&[10.0f32, 20.0, 30.0])?;
        b.add_with_broadcast(m, v, &[0])
    });
    assert_eq!(
        execute(&rows, &[]),
        Literal::array(&[11.0f32, 12.0, 13.0, 24.0, 25.0, 26.0, 37.0, 38.0, 39.0], &[3, 3]).unwrap()
    );
    let cols = build("cols", |b| {
        let m = b.constant(&matrix)?;
        let v = b.constant_r1(&[10.0f32, 20.0, 30.0])?;
        b.add_with_broadcast(m, v, &[1])
    });
    assert_eq!(
        execute(&cols, &[]),
        Literal::array(&[11.0f32, 22.0, 33.0, 14.0, 25.0, 36.0, 17.0, 28.0, 39.0], &[3, 3]).unwrap()
    );
}

#[test]
fn test_scalar_broadcasts_implicitly() {
    let comp = build("scale", |b| {
        let m = b.constant(&Literal::array(&[1i32, 2, 3, 4], &[2, 2]).unwrap())?;
        let two = b.constant_r0(2i32)?;
        b.mul(two, m)
    });
    assert_eq!(
        execute(&comp, &[]),
        Literal::array(&[2i32, 4, 6, 8], &[2, 2]).unwrap()
    );
}

#[test]
fn test_missing_broadcast_dimensions() {
    let mut builder = ComputationBuilder::new("missing");
    let m = builder
        .constant(&Literal::array(&[1.0f32; 6], &[2, 3]).unwrap())
        .unwrap();
    let v = builder.constant_r1(&[1.0f32, 2.0, 3.0]).unwrap();
    let err = builder.add(m, v).unwrap_err();
    assert!(matches!(err, Error::BroadcastDimensionsRequired { .. }));
    assert_eq!(err.kind(), ErrorKind::Build);
}

#[test]
fn test_tuple_and_get_tuple_element() {
    let comp = build("tuple", |b| {
        let x = b.constant_r0(42i32)?;
        let y = b.constant_r1(&[1.0f64, 2.0])?;
        let t = b.tuple(&[x, y])?;
        b.get_tuple_element(t, 1)
    });
    assert_eq!(execute(&comp, &[]), Literal::vector(&[1.0f64, 2.0]));
}

#[test]
fn test_bare_tuple() {
    let comp = build("tuple3", |b| {
        let x = b.constant_r0(1i32)?;
        let y = b.constant_r1(&[2.0f32, 3.0])?;
        let z = b.constant_r0(true)?;
        b.tuple(&[x, y, z])
    });
    let out = execute(&comp, &[]);
    assert_eq!(
        out.shape(),
        Shape::tuple(vec![
            Shape::array::<i32>(&[]),
            Shape::array::<f32>(&[2]),
            Shape::array::<bool>(&[]),
        ])
    );
    assert_eq!(
        out.to_tuple().unwrap(),
        vec![
            Literal::scalar(1i32),
            Literal::vector(&[2.0f32, 3.0]),
            Literal::scalar(true),
        ]
    );
}

#[test]
fn test_reduce_axis_subsets() {
    let sum = scalar_binary("sum", ElementType::F32, |b, x, y| b.add(x, y));
    let values: Vec<f32> = (0..24).map(|i| i as f32).collect();
    let input = Literal::array(&values, &[4, 2, 3]).unwrap();
    let reduce = |dims: &[i64]| {
        let comp = build("reduce", |b| {
            let x = b.constant(&input)?;
            let zero = b.constant_r0(0.0f32)?;
            b.reduce(x, zero, &sum, dims)
        });
        execute(&comp, &[])
    };
    assert_eq!(reduce(&[]), input);
    assert_eq!(
        reduce(&[0]),
        Literal::array(&[36.0f32, 40.0, 44.0, 48.0, 52.0, 56.0], &[2, 3]).unwrap()
    );
    assert_eq!(
        reduce(&[1, 2]),
        Literal::vector(&[15.0f32, 51.0, 87.0, 123.0])
    );
    assert_eq!(
        reduce(&[0, 2]),
        Literal::vector(&[120.0f32, 156.0])
    );
    assert_eq!(reduce(&[0, 1, 2]), Literal::scalar(276.0f32));

    let shape = [4usize, 2, 3];
    for mask in 1..8u32 {
        let dims: Vec<i64> = (0..3i64).filter(|&a| mask & (1 << a) != 0).collect();
        let kept: Vec<usize> = (0..3usize).filter(|&a| mask & (1 << a) == 0).collect();
        let out_dims: Vec<i64> = kept.iter().map(|&a| shape[a] as i64).collect();
        let mut expected = vec![0.0f32; kept.iter().map(|&a| shape[a]).product()];
        for (flat, &value) in values.iter().enumerate() {
            let index = [flat / 6, flat / 3 % 2, flat % 3];
            let out = kept.iter().fold(0, |acc, &a| acc * shape[a] + index[a]);
            expected[out] += value;
        }
        assert_eq!(reduce(&dims), Literal::array(&expected, &out_dims).unwrap());
    }
}

#[test]
fn test_reduce_max() {
    let max = scalar_binary("max", ElementType::S32, |b, x, y| b.max(x, y));
    let comp = build("reduce_max", |b| {
        let x = b.constant(&Literal::array(&[3i32, 9, -1, 4, 0, 7], &[2, 3]).unwrap())?;
        let init = b.constant_r0(i32::MIN)?;
        b.reduce(x, init, &max, &[1])
    });
    assert_eq!(execute(&comp, &[]), Literal::vector(&[9i32, 7]));
}

#[test]
fn test_while_loop_doubles() {
    let cond = build("cond", |b| {
        let x = b.parameter(Shape::scalar(ElementType::F32), None, "x")?;
        let limit = b.constant_r0(10.0f32)?;
        b.lt(x, limit)
    });
    let body = build("body", |b| {
        let x = b.parameter(Shape::scalar(ElementType::F32), None, "x")?;
        let two = b.constant_r0(2.0f32)?;
        b.mul(x, two)
    });
    let comp = build("while", |b| {
        let init = b.constant_r0(1.0f32)?;
        b.while_loop(&cond, &body, init)
    });
    assert_eq!(execute(&comp, &[]), Literal::scalar(16.0f32));
}

#[test]
fn test_call_and_map() {
    let mul = scalar_binary("mul", ElementType::S64, |b, x, y| b.mul(x, y));
    let comp = build("call", |b| {
        let x = b.constant_r0(2i64)?;
        let y = b.constant_r0(5i64)?;
        b.call(&mul, &[x, y])
    });
    assert_eq!(execute(&comp, &[]), Literal::scalar(10i64));

    let comp = build("map", |b| {
        let x = b.constant_r1(&[1i64, 2, 3])?;
        let y = b.constant_r1(&[4i64, 5, 6])?;
        b.map(&[x, y], &mul, &[0])
    });
    assert_eq!(execute(&comp, &[]), Literal::vector(&[4i64, 10, 18]));
}

#[test]
fn test_map_with_sqrt() {
    let sqrt = build("sqrt", |b| {
        let x = b.parameter(Shape::scalar(ElementType::F64), None, "x")?;
        b.sqrt(x)
    });
    let comp = build("map", |b| {
        let x = b.constant(&Literal::array(&[1.0f64, 4.0, 9.0, 16.0], &[2, 2]).unwrap())?;
        b.map(&[x], &sqrt, &[0, 1])
    });
    assert_eq!(
        execute(&comp, &[]),
        Literal::array(&[1.0f64, 2.0, 3.0, 4.0], &[2, 2]).unwrap()
    );
}

#[test]
fn test_parameters_bound_positionally() {
    let comp = scalar_binary("sub", ElementType::F64, |b, x, y| b.sub(x, y));
    let out = execute(&comp, &[Literal::scalar(10.0f64), Literal::scalar(3.0f64)]);
    assert_eq!(out, Literal::scalar(7.0f64));
}

#[test]
fn test_local_buffers() {
    let client = Client::cpu().unwrap();
    let comp = scalar_binary("add", ElementType::F32, |b, x, y| b.add(x, y));
    let exec = client
        .compile_with_example_arguments(&comp, &[Literal::scalar(0.0f32), Literal::scalar(0.0f32)])
        .unwrap();
    let x = client.buffer_from_host(&Literal::scalar(1.5f32));
    let y = client.buffer_from_host(&Literal::scalar(2.0f32));
    let out = exec.execute_with_local_buffers(&[&x, &y]).unwrap();
    assert_eq!(out.to_host().unwrap(), Literal::scalar(3.5f32));
    assert_eq!(client.live_buffer_bytes(), 12);

    y.delete();
    let err = exec.execute_with_local_buffers(&[&x, &y]).unwrap_err();
    assert_eq!(err, Error::DeletedBuffer);
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    // result buffers stay valid independently of their inputs
    x.delete();
    assert_eq!(out.to_host().unwrap(), Literal::scalar(3.5f32));
    assert_eq!(client.live_buffer_bytes(), 4);
}

#[test]
fn test_foreign_buffer_rejected() {
    let client = Client::cpu().unwrap();
    let other = Client::cpu().unwrap();
    let comp = build("id", |b| b.parameter(Shape::scalar(ElementType::S32), None, "x"));
    let exec = client.compile(&comp).unwrap();
    let buffer = other.buffer_from_host(&Literal::scalar(1i32));
    let err = exec.execute_with_local_buffers(&[&buffer]).unwrap_err();
    assert_eq!(err, Error::ForeignBuffer);
}

#[test]
fn test_signature_mismatch_reported_at_execution() {
    let client = Client::cpu().unwrap();
    let comp = build("int_param", |b| b.parameter(Shape::scalar(ElementType::S32), None, "x"));
    let exec = client
        .compile_with_example_arguments(&comp, &[Literal::scalar(1.0f32)])
        .unwrap();
    let err = exec.execute(&[Literal::scalar(1.0f32)]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(
        err.to_string(),
        "invalid argument shape for parameter 0: expected s32[], got f32[]"
    );
}

#[test]
fn test_argument_count_mismatch() {
    let comp = scalar_binary("add", ElementType::S32, |b, x, y| b.add(x, y));
    let exec = Client::cpu().unwrap().compile(&comp).unwrap();
    let err = exec.execute(&[Literal::scalar(1i32)]).unwrap_err();
    assert_eq!(err, Error::ArgumentCountMismatch { expected: 2, got: 1 });
}

#[test]
fn test_infeed_fifo_across_executions() {
    init_tracing();
    let client = Client::cpu().unwrap();
    let comp = build("infeed", |b| b.infeed(Shape::scalar(ElementType::S32)));
    let exec = client.compile(&comp).unwrap();
    for i in 1..=4 {
        client.transfer_to_infeed(&Literal::scalar(i)).unwrap();
    }
    for i in 1..=4 {
        assert_eq!(exec.execute(&[]).unwrap(), Literal::scalar(i));
    }
    assert!(client.infeed().is_empty());
}

#[test]
fn test_execute_blocks_until_infeed_is_fed() {
    init_tracing();
    let client = Client::cpu().unwrap();
    let comp = build("infeed", |b| b.infeed(Shape::scalar(ElementType::S32)));
    let exec = client.compile(&comp).unwrap();
    let feeder = {
        let client = client.clone();
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            client.transfer_to_infeed(&Literal::scalar(7i32)).unwrap();
        })
    };
    assert_eq!(exec.execute(&[]).unwrap(), Literal::scalar(7i32));
    feeder.join().unwrap();
    assert!(client.infeed().is_empty());
}

#[test]
fn test_infeed_shape_mismatch() {
    let client = Client::cpu().unwrap();
    let comp = build("infeed", |b| b.infeed(Shape::array::<f32>(&[2])));
    let exec = client.compile(&comp).unwrap();
    client.transfer_to_infeed(&Literal::scalar(1.0f32)).unwrap();
    let err = exec.execute(&[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Execution);
}

fn arange(dims: &[i64], scale: f32) -> Literal {
    let count: i64 = dims.iter().product();
    let values: Vec<f32> = (0..count).map(|i| i as f32 * scale).collect();
    Literal::array(&values, dims).unwrap()
}

#[test]
fn test_conv_same() {
    let comp = build("conv", |b| {
        let lhs = b.constant(&arange(&[1, 2, 3, 4], 1.0))?;
        let rhs = b.constant(&arange(&[1, 2, 1, 2], 10.0))?;
        b.conv(lhs, rhs, &[1, 1], Padding::Same)
    });
    let expected = Literal::array(
        &[
            640.0f32, 700.0, 760.0, 300.0, 880.0, 940.0, 1000.0, 380.0, 1120.0, 1180.0, 1240.0,
            460.0,
        ],
        &[1, 1, 3, 4],
    )
    .unwrap();
    assert_eq!(execute(&comp, &[]), expected);
}

#[test]
fn test_conv_valid_strided() {
    let comp = build("conv", |b| {
        let lhs = b.constant(&arange(&[1, 2, 3, 4], 1.0))?;
        let rhs = b.constant(&arange(&[1, 2, 1, 2], 10.0))?;
        b.conv(lhs, rhs, &[2, 1], Padding::Valid)
    });
    let expected = Literal::array(
        &[640.0f32, 700.0, 760.0, 1120.0, 1180.0, 1240.0],
        &[1, 1, 2, 3],
    )
    .unwrap();
    assert_eq!(execute(&comp, &[]), expected);
}

#[test]
fn test_conv_general_padding() {
    let comp = build("conv", |b| {
        let lhs = b.constant(&arange(&[1, 1, 2, 3], 1.0))?;
        let rhs = b.constant(&arange(&[1, 1, 1, 2], 10.0))?;
        b.conv_with_general_padding(lhs, rhs, &[1, 1], &[(1, 0), (0, 1)], &[2, 1], &[1, 1])
    });
    let expected = Literal::array(
        &[
            0.0f32, 0.0, 0.0, 10.0, 20.0, 0.0, 0.0, 0.0, 0.0, 40.0, 50.0, 0.0,
        ],
        &[1, 1, 4, 3],
    )
    .unwrap();
    assert_eq!(execute(&comp, &[]), expected);
}

#[test]
fn test_dot() {
    let comp = build("dot", |b| {
        let lhs = b.constant(&Literal::array(&[2.0f64, 3.0, 4.0, 5.0], &[2, 2]).unwrap())?;
        let rhs = b.constant(&Literal::array(&[10.0f64, 20.0, 100.0, 200.0], &[2, 2]).unwrap())?;
        b.dot(lhs, rhs)
    });
    assert_eq!(
        execute(&comp, &[]),
        Literal::array(&[320.0f64, 640.0, 540.0, 1080.0], &[2, 2]).unwrap()
    );

    let comp = build("dot_mv", |b| {
        let lhs = b.constant(&Literal::array(&[1i32, 2, 3, 4, 5, 6], &[2, 3]).unwrap())?;
        let rhs = b.constant_r1(&[1i32, 0, -1])?;
        b.dot(lhs, rhs)
    });
    assert_eq!(execute(&comp, &[]), Literal::vector(&[-2i32, -2]));

    let comp = build("dot_vv", |b| {
        let lhs = b.constant_r1(&[1.0f32, 2.0, 3.0])?;
        let rhs = b.constant_r1(&[4.0f32, 5.0, 6.0])?;
        b.dot(lhs, rhs)
    });
    assert_eq!(execute(&comp, &[]), Literal::scalar(32.0f32));
}

#[test]
fn test_structural_ops() {
    let comp = build("reshape", |b| {
        let x = b.constant(&Literal::array(&[1i32, 2, 3, 4, 5, 6], &[3, 2]).unwrap())?;
        b.reshape(x, None, &[2, 3])
    });
    assert_eq!(
        execute(&comp, &[]),
        Literal::array(&[1i32, 2, 3, 4, 5, 6], &[2, 3]).unwrap()
    );

    let comp = build("reshape_transposed", |b| {
        let x = b.constant(&Literal::array(&[1i32, 2, 3, 4, 5, 6], &[3, 2]).unwrap())?;
        b.reshape(x, Some(&[1, 0]), &[6])
    });
    assert_eq!(
        execute(&comp, &[]),
        Literal::vector(&[1i32, 3, 5, 2, 4, 6])
    );

    let comp = build("collapse", |b| {
        let x = b.constant(&arange(&[2, 3, 4], 1.0))?;
        b.collapse(x, &[0, 1])
    });
    assert_eq!(execute(&comp, &[]).dims().unwrap(), &[6, 4]);

    let comp = build("transpose", |b| {
        let x = b.constant(&Literal::array(&[1i32, 2, 3, 4, 5, 6], &[2, 3]).unwrap())?;
        b.trans(x)
    });
    assert_eq!(
        execute(&comp, &[]),
        Literal::array(&[1i32, 4, 2, 5, 3, 6], &[3, 2]).unwrap()
    );

    let comp = build("rev", |b| {
        let x = b.constant(&Literal::array(&[1i32, 2, 3, 4, 5, 6, 7, 8], &[2, 2, 2]).unwrap())?;
        b.rev(x, &[0, 2])
    });
    assert_eq!(
        execute(&comp, &[]),
        Literal::array(&[6i32, 5, 8, 7, 2, 1, 4, 3], &[2, 2, 2]).unwrap()
    );

    let comp = build("broadcast", |b| {
        let x = b.constant_r1(&[1u32, 2])?;
        b.broadcast(x, &[3])
    });
    assert_eq!(
        execute(&comp, &[]),
        Literal::array(&[1u32, 2, 1, 2, 1, 2], &[3, 2]).unwrap()
    );

    let comp = build("concat", |b| {
        let x = b.constant_r1(&[1.0f32, 2.0, 3.0])?;
        let y = b.constant_r1(&[4.0f32, 5.0])?;
        b.concatenate(&[x, y], 0)
    });
    assert_eq!(
        execute(&comp, &[]),
        Literal::vector(&[1.0f32, 2.0, 3.0, 4.0, 5.0])
    );

    let comp = build("concat_cols", |b| {
        let x = b.constant(&Literal::array(&[1i32, 2], &[2, 1]).unwrap())?;
        let y = b.constant(&Literal::array(&[3i32, 4, 5, 6], &[2, 2]).unwrap())?;
        b.concatenate(&[x, y], 1)
    });
    assert_eq!(
        execute(&comp, &[]),
        Literal::array(&[1i32, 3, 4, 2, 5, 6], &[2, 3]).unwrap()
    );
}

#[test]
fn test_slices() {
    let matrix = Literal::array(&[1i32, 2, 3, 4, 5, 6, 7, 8, 9], &[3, 3]).unwrap();
    let comp = build("slice", |b| {
        let x = b.constant(&matrix)?;
        b.slice(x, &[1, 0], &[3, 2])
    });
    assert_eq!(
        execute(&comp, &[]),
        Literal::array(&[4i32, 5, 7, 8], &[2, 2]).unwrap()
    );

    let comp = build("strided", |b| {
        let x = b.constant_r1(&[0i64, 1, 2, 3, 4, 5, 6])?;
        b.slice_with_strides(x, &[1], &[7], &[3])
    });
    assert_eq!(execute(&comp, &[]), Literal::vector(&[1i64, 4]));

    let comp = build("dynamic_slice", |b| {
        let x = b.constant(&matrix)?;
        let start = b.constant_r1(&[1i32, 1])?;
        b.dynamic_slice(x, start, &[2, 2])
    });
    assert_eq!(
        execute(&comp, &[]),
        Literal::array(&[5i32, 6, 8, 9], &[2, 2]).unwrap()
    );

    let comp = build("dynamic_update_slice", |b| {
        let x = b.constant(&matrix)?;
        let update = b.constant(&Literal::array(&[1i32, 2, 3, 4], &[2, 2]).unwrap())?;
        let start = b.constant_r1(&[1i32, 1])?;
        b.dynamic_update_slice(x, update, start)
    });
    assert_eq!(
        execute(&comp, &[]),
        Literal::array(&[1i32, 2, 3, 4, 1, 2, 7, 3, 4], &[3, 3]).unwrap()
    );
}

#[test]
fn test_dynamic_update_slice_clamps_start() {
    let update_at = |start: Literal| {
        build("dynamic_update_slice", move |b| {
            let x = b.constant_r1(&[1i32, 2, 3, 4, 5])?;
            let update = b.constant_r1(&[9i32, 9])?;
            let start = b.constant(&start)?;
            b.dynamic_update_slice(x, update, start)
        })
    };
    assert_eq!(
        execute(&update_at(Literal::vector(&[10i32])), &[]),
        Literal::vector(&[1i32, 2, 3, 9, 9])
    );
    assert_eq!(
        execute(&update_at(Literal::vector(&[-3i64])), &[]),
        Literal::vector(&[9i32, 9, 3, 4, 5])
    );
    assert_eq!(
        execute(&update_at(Literal::vector(&[u64::MAX])), &[]),
        Literal::vector(&[1i32, 2, 3, 9, 9])
    );
}

#[test]
fn test_select() {
    let comp = build("select", |b| {
        let pred = b.constant_r1(&[true, false, false, true])?;
        let on_true = b.constant_r1(&[1.0f64, 2.0, 3.0, 4.0])?;
        let on_false = b.constant_r1(&[-1.0f64, -2.0, -3.0, -4.0])?;
        b.select(pred, on_true, on_false)
    });
    assert_eq!(
        execute(&comp, &[]),
        Literal::vector(&[1.0f64, -2.0, -3.0, 4.0])
    );
}

#[test]
fn test_convert_element_type() {
    let comp = build("convert", |b| {
        let x = b.constant_r1(&[1.9f32, -2.7, 0.0])?;
        let ints = b.convert_element_type(x, ElementType::S32)?;
        let preds = b.convert_element_type(x, ElementType::Pred)?;
        b.tuple(&[ints, preds])
    });
    let out = execute(&comp, &[]).to_tuple().unwrap();
    assert_eq!(out[0], Literal::vector(&[1i32, -2, 0]));
    assert_eq!(out[1], Literal::vector(&[true, true, false]));
}

#[test]
fn test_cross_replica_sum_is_identity() {
    let comp = build("crs", |b| {
        let x = b.constant_r1(&[1.0f32, 2.0])?;
        b.cross_replica_sum(x)
    });
    assert_eq!(execute(&comp, &[]), Literal::vector(&[1.0f32, 2.0]));
}

#[test]
fn test_rng_uniform_in_range() {
    let comp = build("rng", |b| {
        let lo = b.constant_r0(2.0f32)?;
        let hi = b.constant_r0(4.0f32)?;
        b.rng_uniform(lo, hi, &[100])
    });
    let out = execute(&comp, &[]);
    assert_eq!(out.dims().unwrap(), &[100]);
    assert!(out.typed_buf::<f32>().unwrap().iter().all(|x| (2.0..4.0).contains(x)));
}

#[test]
fn test_rng_seeded_is_reproducible() {
    let client = Client::cpu().unwrap().with_options(crate::CompileOptions {
        rng_seed: Some(3),
        ..Default::default()
    });
    let comp = build("rng", |b| {
        let mu = b.constant_r0(0.0f64)?;
        let sigma = b.constant_r0(1.0f64)?;
        b.rng_normal(mu, sigma, &[2, 3])
    });
    let first = client.compile(&comp).unwrap().execute(&[]).unwrap();
    let second = client.compile(&comp).unwrap().execute(&[]).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.shape(), Shape::array::<f64>(&[2, 3]));
}

#[test]
fn test_rng_empty_range_fails_at_execution() {
    let comp = build("rng", |b| {
        let lo = b.constant_r0(5i32)?;
        let hi = b.constant_r0(5i32)?;
        b.rng_uniform(lo, hi, &[1])
    });
    let err = Client::cpu()
        .unwrap()
        .compile(&comp)
        .unwrap()
        .execute(&[])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Execution);
}
